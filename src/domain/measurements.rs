//! Roof measurement domain types
//!
//! Geometry from a roof-measurement report plus the roof-type
//! classification. Every numeric field is nullable: a missing value means
//! the report did not provide it, never zero.

use serde::{Deserialize, Serialize};

/// Where the measurements were read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSource {
    Eagleview,
    ManualReport,
    #[default]
    #[serde(other)]
    Other,
}

impl std::fmt::Display for MeasurementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementSource::Eagleview => write!(f, "EagleView report"),
            MeasurementSource::ManualReport => write!(f, "manual measurement report"),
            MeasurementSource::Other => write!(f, "measurement document"),
        }
    }
}

/// Per-job roof geometry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoofMeasurements {
    pub ridge_length: Option<f64>,
    pub hip_length: Option<f64>,
    pub total_ridge_hip: Option<f64>,
    pub eave_length: Option<f64>,
    pub total_eaves: Option<f64>,
    pub rake_length: Option<f64>,
    pub total_rakes: Option<f64>,
    pub valley_length: Option<f64>,
    pub total_roof_area: Option<f64>,
    pub squares: Option<f64>,
    pub predominant_pitch: Option<String>,
    pub number_of_stories: Option<u32>,
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub source_pages: Vec<u32>,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub extracted_from: MeasurementSource,
}

impl RoofMeasurements {
    /// Eave length, accepting either report field
    pub fn eaves(&self) -> Option<f64> {
        self.eave_length.or(self.total_eaves)
    }

    /// Rake length, accepting either report field
    pub fn rakes(&self) -> Option<f64> {
        self.rake_length.or(self.total_rakes)
    }

    /// Roof area in square feet, derived from squares when only those were reported
    pub fn roof_area(&self) -> Option<f64> {
        self.total_roof_area
            .or_else(|| self.squares.map(|squares| squares * 100.0))
    }

    /// "pages 2, 3" style citation for evidence lists
    pub fn page_citation(&self) -> String {
        match self.source_pages.as_slice() {
            [] => format!("{} (page not recorded)", self.extracted_from),
            [page] => format!("{} page {}", self.extracted_from, page),
            pages => format!(
                "{} pages {}",
                self.extracted_from,
                pages
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    pub(crate) fn numeric_fields(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        [
            ("ridgeLength", self.ridge_length),
            ("hipLength", self.hip_length),
            ("totalRidgeHip", self.total_ridge_hip),
            ("eaveLength", self.eave_length),
            ("totalEaves", self.total_eaves),
            ("rakeLength", self.rake_length),
            ("totalRakes", self.total_rakes),
            ("valleyLength", self.valley_length),
            ("totalRoofArea", self.total_roof_area),
            ("squares", self.squares),
            ("confidence", self.confidence),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

/// Shingle system on the roof
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoofType {
    #[serde(rename = "laminated")]
    Laminated,
    #[serde(rename = "3-tab")]
    ThreeTab,
    #[default]
    #[serde(rename = "other", other)]
    Other,
}

impl std::fmt::Display for RoofType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoofType::Laminated => write!(f, "laminated"),
            RoofType::ThreeTab => write!(f, "3-tab"),
            RoofType::Other => write!(f, "other"),
        }
    }
}

/// Roof-type classification with the evidence behind it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoofTypeClassification {
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub roof_type: RoofType,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub confidence: f64,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub reasoning: String,
    #[serde(deserialize_with = "crate::domain::nullable::deserialize")]
    pub evidence: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eaves_prefers_eave_length_over_total() {
        let m = RoofMeasurements {
            eave_length: Some(120.0),
            total_eaves: Some(118.0),
            ..Default::default()
        };
        assert_eq!(m.eaves(), Some(120.0));

        let m = RoofMeasurements {
            total_eaves: Some(118.0),
            ..Default::default()
        };
        assert_eq!(m.eaves(), Some(118.0));
    }

    #[test]
    fn unknown_roof_type_strings_map_to_other() {
        let c: RoofTypeClassification =
            serde_json::from_value(serde_json::json!({ "roofType": "metal", "confidence": 0.4 }))
                .unwrap();
        assert_eq!(c.roof_type, RoofType::Other);

        let c: RoofTypeClassification =
            serde_json::from_value(serde_json::json!({ "roofType": "3-tab" })).unwrap();
        assert_eq!(c.roof_type, RoofType::ThreeTab);
    }

    #[test]
    fn explicit_nulls_read_as_defaults() {
        let m: RoofMeasurements = serde_json::from_value(serde_json::json!({
            "ridgeLength": null,
            "eaveLength": 120.0,
            "sourcePages": null,
            "extractedFrom": null
        }))
        .unwrap();
        assert_eq!(m.ridge_length, None);
        assert_eq!(m.eaves(), Some(120.0));
        assert!(m.source_pages.is_empty());
        assert_eq!(m.extracted_from, MeasurementSource::Other);

        let m: RoofMeasurements =
            serde_json::from_value(serde_json::json!({ "extractedFrom": "hover" })).unwrap();
        assert_eq!(m.extracted_from, MeasurementSource::Other);

        let c: RoofTypeClassification = serde_json::from_value(serde_json::json!({
            "roofType": null,
            "confidence": null,
            "reasoning": null,
            "evidence": null
        }))
        .unwrap();
        assert_eq!(c, RoofTypeClassification::default());
    }

    #[test]
    fn page_citation_lists_pages() {
        let m = RoofMeasurements {
            source_pages: vec![2, 3],
            extracted_from: MeasurementSource::Eagleview,
            ..Default::default()
        };
        assert_eq!(m.page_citation(), "EagleView report pages 2, 3");
    }

    #[test]
    fn roof_area_derives_from_squares() {
        let m = RoofMeasurements {
            squares: Some(28.5),
            ..Default::default()
        };
        assert_eq!(m.roof_area(), Some(2850.0));
    }
}
