//! Estimate domain types
//!
//! Line items as produced by the extraction collaborator. These arrive as
//! JSON in the extraction shape (camelCase) and are read-only for the
//! analyzers.

use serde::{Deserialize, Serialize};

/// Quantity of a line item: numeric value plus the unit printed on the estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quantity {
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub value: f64,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// Normalized unit code ("LF", "SF", "SQ", "EA", ...)
    pub fn unit_code(&self) -> String {
        let unit = self.unit.trim().to_uppercase().replace('.', "");
        match unit.as_str() {
            "LF" | "LIN FT" | "LINEAR FEET" | "FT" => "LF".to_string(),
            "SF" | "SQ FT" | "SQUARE FEET" | "SQFT" => "SF".to_string(),
            "SQ" | "SQUARE" | "SQUARES" => "SQ".to_string(),
            _ => unit,
        }
    }
}

/// Page and verbatim snippet the extraction model read a value from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceReference {
    pub page: Option<u32>,
    pub text: Option<String>,
}

/// Ridge cap product quality as classified during extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RidgeCapQuality {
    PurposeBuilt,
    HighProfile,
    #[serde(rename = "cut-from-3tab")]
    CutFrom3Tab,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RidgeCapQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RidgeCapQuality::PurposeBuilt => write!(f, "purpose-built"),
            RidgeCapQuality::HighProfile => write!(f, "high-profile"),
            RidgeCapQuality::CutFrom3Tab => write!(f, "cut-from-3tab"),
            RidgeCapQuality::Unknown => write!(f, "unknown"),
        }
    }
}

/// One row of an insurance estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineItem {
    pub code: Option<String>,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub description: String,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub quantity: Quantity,
    pub unit_price: Option<f64>,
    pub tax: Option<f64>,
    pub replacement_cost_value: Option<f64>,
    pub depreciation: Option<f64>,
    pub actual_cash_value: Option<f64>,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub confidence: f64,
    pub source_reference: Option<SourceReference>,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub is_ridge_cap_item: bool,
    pub ridge_cap_quality: Option<RidgeCapQuality>,
}

impl LineItem {
    /// Lowercased description with the code appended, used for keyword matching
    pub fn search_text(&self) -> String {
        let mut text = self.description.to_lowercase();
        if let Some(code) = &self.code {
            text.push(' ');
            text.push_str(&code.to_lowercase());
        }
        text
    }

    pub fn source_page(&self) -> Option<u32> {
        self.source_reference.as_ref().and_then(|r| r.page)
    }

    /// Extended total for the row: replacement cost when extracted, else quantity x rate
    pub fn total(&self) -> Option<f64> {
        self.replacement_cost_value
            .or_else(|| self.unit_price.map(|price| price * self.quantity.value))
    }

    /// Every numeric field this item carries, paired with its name
    pub(crate) fn numeric_fields(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        [
            ("quantity", Some(self.quantity.value)),
            ("unitPrice", self.unit_price),
            ("tax", self.tax),
            ("replacementCostValue", self.replacement_cost_value),
            ("depreciation", self.depreciation),
            ("actualCashValue", self.actual_cash_value),
            ("confidence", Some(self.confidence)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}
