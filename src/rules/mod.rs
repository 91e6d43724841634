//! Business rule compliance engine
//!
//! Four pure analyzers map (line items, roof measurements, roof type) to a
//! [`RuleAnalysis`]. They hold no state between calls, so one [`RuleSet`]
//! can be shared across jobs and threads.

pub mod drip_edge;
pub mod ice_water;
pub mod precision;
pub mod ridge_cap;
pub mod starter_strip;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::analysis::{RuleAnalysis, VarianceType};
use crate::domain::estimate::LineItem;
use crate::domain::measurements::{RoofMeasurements, RoofType, RoofTypeClassification};
use crate::domain::progress::RuleType;

pub use drip_edge::DripEdgeRule;
pub use ice_water::IceWaterRule;
pub use ridge_cap::RidgeCapRule;
pub use starter_strip::StarterStripRule;

use precision::{safe_subtract, DEFAULT_DECIMALS};

// ============================================================================
// Input and errors
// ============================================================================

/// Everything a rule may look at for one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub job_id: Uuid,
    #[serde(default, deserialize_with = "crate::domain::nullable::deserialize")]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub roof_measurements: Option<RoofMeasurements>,
    #[serde(default)]
    pub roof_type: Option<RoofTypeClassification>,
}

impl AnalysisInput {
    pub fn roof_type(&self) -> RoofType {
        self.roof_type
            .as_ref()
            .map(|c| c.roof_type)
            .unwrap_or(RoofType::Other)
    }

    pub fn measurements(&self) -> Option<&RoofMeasurements> {
        self.roof_measurements.as_ref()
    }

    /// Reject non-finite numbers before any rule does arithmetic on them
    pub fn validate(&self) -> Result<(), RuleError> {
        for (index, item) in self.line_items.iter().enumerate() {
            for (field, value) in item.numeric_fields() {
                if !value.is_finite() {
                    return Err(RuleError::InvalidInput(format!(
                        "line item {} ({}) has non-finite {}",
                        index, item.description, field
                    )));
                }
            }
        }
        if let Some(measurements) = &self.roof_measurements {
            for (field, value) in measurements.numeric_fields() {
                if !value.is_finite() || value < 0.0 {
                    return Err(RuleError::InvalidInput(format!(
                        "roof measurement {} is {}",
                        field, value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Failure inside a rule; the worker records it and moves on
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation failed: {0}")]
    Computation(String),
}

/// One compliance rule
pub trait ComplianceRule: Send + Sync {
    fn rule_type(&self) -> RuleType;

    fn evaluate(&self, input: &AnalysisInput) -> Result<RuleAnalysis, RuleError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Unit rates used for cost impact; standard market rates, overridable
#[derive(Debug, Clone, PartialEq)]
pub struct RulePricing {
    pub ridge_cap_per_lf: f64,
    pub drip_edge_per_lf: f64,
    pub gutter_apron_per_lf: f64,
    pub ice_water_per_sf: f64,
    pub starter_strip_per_lf: f64,
}

impl Default for RulePricing {
    fn default() -> Self {
        Self {
            ridge_cap_per_lf: 42.90,
            drip_edge_per_lf: 2.85,
            gutter_apron_per_lf: 3.15,
            ice_water_per_sf: 1.85,
            starter_strip_per_lf: 2.85,
        }
    }
}

/// Eave geometry assumed when the report does not measure it
#[derive(Debug, Clone, PartialEq)]
pub struct EaveGeometry {
    pub soffit_depth_in: f64,
    pub wall_thickness_in: f64,
    pub code_minimum_in: f64,
    pub safety_margin: f64,
    pub tolerance_sf: f64,
}

impl Default for EaveGeometry {
    fn default() -> Self {
        Self {
            soffit_depth_in: 12.0,
            wall_thickness_in: 6.0,
            code_minimum_in: 24.0,
            safety_margin: 0.05,
            tolerance_sf: 25.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleConfig {
    pub pricing: RulePricing,
    pub eave_geometry: EaveGeometry,
}

// ============================================================================
// Rule set
// ============================================================================

/// The rules a worker runs, one per [`RuleType`]
pub struct RuleSet {
    ridge_cap: Box<dyn ComplianceRule>,
    starter_strip: Box<dyn ComplianceRule>,
    drip_edge: Box<dyn ComplianceRule>,
    ice_water: Box<dyn ComplianceRule>,
}

impl RuleSet {
    pub fn standard(config: &RuleConfig) -> Self {
        Self {
            ridge_cap: Box::new(RidgeCapRule::new(config.pricing.ridge_cap_per_lf)),
            starter_strip: Box::new(StarterStripRule::new(config.pricing.starter_strip_per_lf)),
            drip_edge: Box::new(DripEdgeRule::new(
                config.pricing.drip_edge_per_lf,
                config.pricing.gutter_apron_per_lf,
            )),
            ice_water: Box::new(IceWaterRule::new(
                config.pricing.ice_water_per_sf,
                config.eave_geometry.clone(),
            )),
        }
    }

    /// Replace the rule registered for `rule.rule_type()`
    pub fn with_rule(mut self, rule: Box<dyn ComplianceRule>) -> Self {
        match rule.rule_type() {
            RuleType::RidgeCap => self.ridge_cap = rule,
            RuleType::StarterStrip => self.starter_strip = rule,
            RuleType::DripEdge => self.drip_edge = rule,
            RuleType::IceAndWater => self.ice_water = rule,
        }
        self
    }

    pub fn get(&self, rule: RuleType) -> &dyn ComplianceRule {
        match rule {
            RuleType::RidgeCap => self.ridge_cap.as_ref(),
            RuleType::StarterStrip => self.starter_strip.as_ref(),
            RuleType::DripEdge => self.drip_edge.as_ref(),
            RuleType::IceAndWater => self.ice_water.as_ref(),
        }
    }

    /// Run one rule and refuse a result holding a non-finite number, which
    /// would not survive a JSON round trip through the store
    pub fn evaluate(&self, rule: RuleType, input: &AnalysisInput) -> Result<RuleAnalysis, RuleError> {
        let analysis = self.get(rule).evaluate(input)?;
        for (name, value) in analysis.numeric_fields() {
            ensure_finite(name, value)?;
        }
        Ok(analysis)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard(&RuleConfig::default())
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Variance between estimate and requirement, classified by tolerance band
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Variance {
    pub amount: f64,
    pub kind: VarianceType,
}

impl Variance {
    /// `amount < -shortage_tolerance` is a shortage, `amount > excess_threshold` an excess
    pub fn classify(
        estimate: f64,
        required: f64,
        shortage_tolerance: f64,
        excess_threshold: f64,
    ) -> Self {
        let amount = safe_subtract(estimate, required, DEFAULT_DECIMALS);
        let kind = if amount < -shortage_tolerance {
            VarianceType::Shortage
        } else if amount > excess_threshold {
            VarianceType::Excess
        } else {
            VarianceType::Adequate
        };
        Self { amount, kind }
    }

    pub fn shortfall(&self) -> f64 {
        if self.kind == VarianceType::Shortage {
            -self.amount
        } else {
            0.0
        }
    }
}

/// Case-insensitive keyword match against description and code
pub(crate) fn mentions_any(item: &LineItem, keywords: &[&str]) -> bool {
    let text = item.search_text();
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// Sum of quantities, skipping the sign of credit lines
pub(crate) fn total_quantity<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> f64 {
    items
        .into_iter()
        .fold(0.0, |acc, item| precision::safe_add(acc, item.quantity.value.max(0.0), DEFAULT_DECIMALS))
}

/// First unit price found among the items
pub(crate) fn first_unit_price<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Option<f64> {
    items
        .into_iter()
        .filter_map(|item| item.unit_price)
        .find(|price| *price > 0.0)
}

pub(crate) fn clamp_confidence(value: f64, min: f64, max: f64) -> f64 {
    precision::round_to_precision(value.clamp(min, max), DEFAULT_DECIMALS)
}

/// Evidence citation for an estimate line item
pub(crate) fn line_item_evidence(item: &LineItem) -> String {
    let code = item
        .code
        .as_deref()
        .map(|c| format!("{} ", c))
        .unwrap_or_default();
    match item.source_page() {
        Some(page) => format!(
            "Estimate page {}: {}\"{}\" ({} {})",
            page,
            code,
            item.description,
            precision::format_number(item.quantity.value, 2, true),
            item.quantity.unit
        ),
        None => format!(
            "Estimate line item: {}\"{}\" ({} {})",
            code,
            item.description,
            precision::format_number(item.quantity.value, 2, true),
            item.quantity.unit
        ),
    }
}

pub(crate) fn measurement_evidence(measurements: Option<&RoofMeasurements>, detail: &str) -> String {
    match measurements {
        Some(m) => format!("{}: {}", m.page_citation(), detail),
        None => format!("No roof measurement report: {}", detail),
    }
}

/// Reject figures that would poison a persisted record
pub(crate) fn ensure_finite(label: &str, value: f64) -> Result<f64, RuleError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RuleError::Computation(format!("{} is {}", label, value)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::estimate::{Quantity, SourceReference};
    use crate::domain::measurements::MeasurementSource;

    pub fn item(description: &str, quantity: f64, unit: &str, price: Option<f64>) -> LineItem {
        LineItem {
            code: None,
            description: description.to_string(),
            quantity: Quantity::new(quantity, unit),
            unit_price: price,
            confidence: 0.9,
            source_reference: Some(SourceReference {
                page: Some(3),
                text: Some(description.to_string()),
            }),
            ..Default::default()
        }
    }

    pub fn eagleview() -> RoofMeasurements {
        RoofMeasurements {
            confidence: Some(0.9),
            source_pages: vec![1, 2],
            extracted_from: MeasurementSource::Eagleview,
            ..Default::default()
        }
    }

    pub fn classified(roof_type: RoofType) -> RoofTypeClassification {
        RoofTypeClassification {
            roof_type,
            confidence: 0.9,
            reasoning: "Shingle description on estimate".to_string(),
            evidence: vec!["Laminated comp shingle".to_string()],
        }
    }

    /// Laminated roof with every rule's material on the estimate
    pub fn scenario_input(job_id: Uuid) -> AnalysisInput {
        let mut ridge = item("Hip / Ridge cap - Standard profile", 6.0, "LF", Some(42.90));
        ridge.is_ridge_cap_item = true;
        let line_items = vec![
            ridge,
            item("Drip edge", 140.0, "LF", Some(2.85)),
            item("Gutter apron", 120.0, "LF", Some(3.15)),
            item("Ice & water barrier", 500.0, "SF", Some(1.85)),
            item("Starter strip - universal", 120.0, "LF", Some(2.85)),
        ];
        AnalysisInput {
            job_id,
            line_items,
            roof_measurements: Some(RoofMeasurements {
                ridge_length: Some(26.0),
                hip_length: Some(93.0),
                eave_length: Some(120.0),
                rake_length: Some(140.0),
                predominant_pitch: Some("6/12".to_string()),
                ..eagleview()
            }),
            roof_type: Some(classified(RoofType::Laminated)),
        }
    }

    pub fn input(
        line_items: Vec<LineItem>,
        measurements: Option<RoofMeasurements>,
        roof_type: Option<RoofType>,
    ) -> AnalysisInput {
        AnalysisInput {
            job_id: Uuid::new_v4(),
            line_items,
            roof_measurements: measurements,
            roof_type: roof_type.map(classified),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn variance_bands_are_exclusive_on_the_shortage_side() {
        assert_eq!(
            Variance::classify(114.0, 119.0, 5.0, 20.0).kind,
            VarianceType::Adequate
        );
        assert_eq!(
            Variance::classify(113.99, 119.0, 5.0, 20.0).kind,
            VarianceType::Shortage
        );
        assert_eq!(
            Variance::classify(140.0, 119.0, 5.0, 20.0).kind,
            VarianceType::Excess
        );
        assert_eq!(
            Variance::classify(139.0, 119.0, 5.0, 20.0).kind,
            VarianceType::Adequate
        );
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let mut bad = item("Ridge cap", f64::NAN, "LF", None);
        bad.is_ridge_cap_item = true;
        let input = input(vec![bad], None, None);
        assert!(matches!(input.validate(), Err(RuleError::InvalidInput(_))));

        let measurements = RoofMeasurements {
            eave_length: Some(f64::INFINITY),
            ..eagleview()
        };
        let input = super::test_support::input(vec![], Some(measurements), None);
        assert!(input.validate().is_err());
    }

    #[test]
    fn missing_roof_type_routes_to_other() {
        let input = input(vec![], None, None);
        assert_eq!(input.roof_type(), RoofType::Other);
    }

    #[test]
    fn line_item_evidence_cites_page() {
        let evidence = line_item_evidence(&item("Drip edge", 120.0, "LF", Some(2.85)));
        assert_eq!(evidence, "Estimate page 3: \"Drip edge\" (120 LF)");
    }

    #[test]
    fn rule_set_override_replaces_only_that_rule() {
        struct Fixed;
        impl ComplianceRule for Fixed {
            fn rule_type(&self) -> RuleType {
                RuleType::DripEdge
            }
            fn evaluate(&self, _input: &AnalysisInput) -> Result<RuleAnalysis, RuleError> {
                Err(RuleError::Computation("boom".to_string()))
            }
        }

        let rules = RuleSet::default().with_rule(Box::new(Fixed));
        let input = input(vec![], None, None);
        assert!(rules.get(RuleType::DripEdge).evaluate(&input).is_err());
        assert!(rules.get(RuleType::IceAndWater).evaluate(&input).is_ok());
    }

    #[test]
    fn job_with_nothing_extracted_still_evaluates() {
        use crate::domain::analysis::{ComplianceStatus, RequiredLengthSource, RidgeCapPath};

        let input = AnalysisInput {
            job_id: Uuid::new_v4(),
            ..Default::default()
        };
        let rules = RuleSet::default();

        for rule_type in RuleType::ALL {
            let analysis = rules.evaluate(rule_type, &input).unwrap();
            match analysis {
                RuleAnalysis::RidgeCap(ridge) => {
                    assert_eq!(ridge.analysis_path, RidgeCapPath::UnknownRoofMissingMaterial);
                    assert_eq!(ridge.required_source, RequiredLengthSource::Fallback);
                    assert_eq!(ridge.result.status, ComplianceStatus::SupplementNeeded);
                    assert_eq!(ridge.result.required_quantity, Some(100.0));
                    assert_eq!(ridge.result.cost_impact, 4290.0);
                }
                other => {
                    assert_eq!(
                        other.result().status,
                        ComplianceStatus::InsufficientData,
                        "{:?}",
                        rule_type
                    );
                    assert_eq!(other.result().cost_impact, 0.0);
                }
            }
        }
    }

    #[test]
    fn huge_quantities_stay_finite_or_fail_cleanly() {
        let mut ridge = item("Hip / Ridge cap - Standard profile", 1e307, "LF", Some(42.90));
        ridge.is_ridge_cap_item = true;
        let rules = RuleSet::default();

        let analysis = rules
            .evaluate(RuleType::RidgeCap, &input(vec![ridge.clone()], None, None))
            .unwrap();
        assert_eq!(analysis.result().estimate_quantity, 1e307);
        let json = serde_json::to_value(&analysis).unwrap();
        let back: RuleAnalysis = serde_json::from_value(json).unwrap();
        assert_eq!(back.result().estimate_quantity, 1e307);

        ridge.quantity.value = 1e308;
        let overflow = input(vec![ridge.clone(), ridge], None, None);
        assert!(matches!(
            rules.evaluate(RuleType::RidgeCap, &overflow),
            Err(RuleError::Computation(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn shortage_always_has_negative_amount(
            estimate in 0.0f64..500.0,
            required in 0.0f64..500.0,
            tolerance in 0.0f64..30.0,
        ) {
            let variance = Variance::classify(estimate, required, tolerance, 20.0);
            if variance.kind == VarianceType::Shortage {
                proptest::prop_assert!(variance.amount < 0.0);
                proptest::prop_assert!(variance.shortfall() > 0.0);
            }
            if variance.amount >= 0.0 {
                proptest::prop_assert!(variance.kind != VarianceType::Shortage);
                proptest::prop_assert_eq!(variance.shortfall(), 0.0);
            }
        }

        #[test]
        fn every_analyzer_bills_its_shortages(quantity in 0u32..400) {
            let quantity = f64::from(quantity);
            let mut ridge = item("Hip / Ridge cap - Standard profile", quantity, "LF", Some(42.90));
            ridge.is_ridge_cap_item = true;
            let measurements = RoofMeasurements {
                ridge_length: Some(26.0),
                hip_length: Some(93.0),
                eave_length: Some(120.0),
                rake_length: Some(140.0),
                predominant_pitch: Some("6/12".to_string()),
                ..eagleview()
            };
            let input = input(
                vec![
                    ridge,
                    item("Drip edge", quantity, "LF", Some(2.85)),
                    item("Gutter apron", quantity, "LF", Some(3.15)),
                    item("Ice & water barrier", quantity, "SF", Some(1.85)),
                    item("Starter strip - universal", quantity, "LF", Some(2.85)),
                ],
                Some(measurements),
                Some(RoofType::Laminated),
            );

            let rules = RuleSet::default();
            for rule_type in RuleType::ALL {
                let analysis = rules.get(rule_type).evaluate(&input).map_err(|e| {
                    proptest::test_runner::TestCaseError::fail(e.to_string())
                })?;
                let result = analysis.result();
                if result.variance_type == Some(VarianceType::Shortage) {
                    proptest::prop_assert!(result.variance_amount.unwrap_or(0.0) < 0.0, "{:?}", rule_type);
                    proptest::prop_assert!(result.cost_impact > 0.0, "{:?}", rule_type);
                }
            }
        }
    }
}
