//! Starter strip rule
//!
//! Laminated roofs need a purpose-made universal starter product along the
//! eaves; starter cut from waste shingles does not seal the first course.
//! 3-tab and other roofs accept either product and only get a quantity check.

use chrono::Utc;

use super::precision::{
    format_currency, format_measurement, format_signed_measurement, safe_multiply,
    DEFAULT_DECIMALS,
};
use super::{
    clamp_confidence, ensure_finite, first_unit_price, line_item_evidence, measurement_evidence,
    mentions_any, total_quantity, AnalysisInput, ComplianceRule, RuleError, Variance,
};
use crate::domain::analysis::{
    ComplianceResult, ComplianceStatus, CurrentSpecification, LineItemSnapshot, MaterialStatus,
    RuleAnalysis, StarterStripAnalysis, StarterStripPath, StarterType, VarianceType,
};
use crate::domain::estimate::LineItem;
use crate::domain::measurements::{MeasurementSource, RoofType};
use crate::domain::progress::RuleType;

pub const SHORTAGE_TOLERANCE_LF: f64 = 5.0;
pub const EXCESS_THRESHOLD_LF: f64 = 20.0;

const STARTER_KEYWORDS: &[&str] = &["starter"];
const UNIVERSAL_KEYWORDS: &[&str] = &["universal", "pro-start", "prostart", "swiftstart", "starter strip shingle"];
const CUT_KEYWORDS: &[&str] = &["cut", "waste", "3-tab", "3 tab", "three tab"];

pub struct StarterStripRule {
    default_unit_price: f64,
}

impl StarterStripRule {
    pub fn new(default_unit_price: f64) -> Self {
        Self { default_unit_price }
    }
}

impl Default for StarterStripRule {
    fn default() -> Self {
        Self::new(super::RulePricing::default().starter_strip_per_lf)
    }
}

impl ComplianceRule for StarterStripRule {
    fn rule_type(&self) -> RuleType {
        RuleType::StarterStrip
    }

    fn evaluate(&self, input: &AnalysisInput) -> Result<RuleAnalysis, RuleError> {
        input.validate()?;
        self.analyze(input).map(RuleAnalysis::StarterStrip)
    }
}

/// Cut-from-waste on any matched line wins over a universal product elsewhere
pub(crate) fn starter_type(items: &[&LineItem]) -> Option<StarterType> {
    if items.is_empty() {
        return None;
    }
    if items.iter().any(|i| mentions_any(i, CUT_KEYWORDS)) {
        Some(StarterType::CutFromWaste)
    } else if items.iter().any(|i| mentions_any(i, UNIVERSAL_KEYWORDS)) {
        Some(StarterType::Universal)
    } else {
        Some(StarterType::Unspecified)
    }
}

impl StarterStripRule {
    fn analyze(&self, input: &AnalysisInput) -> Result<StarterStripAnalysis, RuleError> {
        let measurements = input.measurements();
        let roof_type = input.roof_type();
        let items: Vec<&LineItem> = input
            .line_items
            .iter()
            .filter(|i| mentions_any(i, STARTER_KEYWORDS))
            .collect();
        let starter_type = starter_type(&items);
        let estimate = total_quantity(items.iter().copied());
        let mut evidence: Vec<String> = items.iter().map(|i| line_item_evidence(i)).collect();
        let current_specification = items
            .first()
            .map(|item| CurrentSpecification::Single(LineItemSnapshot::from(*item)));
        let cut_on_laminated =
            roof_type == RoofType::Laminated && starter_type == Some(StarterType::CutFromWaste);
        let material_status = if items.is_empty() || cut_on_laminated {
            MaterialStatus::NonCompliant
        } else {
            MaterialStatus::Compliant
        };

        let Some(eaves) = measurements.and_then(|m| m.eaves()) else {
            evidence.push(measurement_evidence(measurements, "eave length not reported"));
            let material = match starter_type {
                None => "No starter strip line item was found on the estimate.".to_string(),
                Some(_) if cut_on_laminated => {
                    "The estimate uses starter cut from waste on a laminated roof, which needs a universal starter product."
                        .to_string()
                }
                Some(_) => format!(
                    "The estimate carries {} of starter.",
                    format_measurement(estimate, "LF")
                ),
            };
            return Ok(StarterStripAnalysis {
                result: ComplianceResult {
                    status: ComplianceStatus::InsufficientData,
                    confidence: 0.2,
                    reasoning: format!(
                        "Eave length is not available from the measurement report, so starter strip quantity cannot be \
                         verified. {}",
                        material
                    ),
                    unit: "LF".to_string(),
                    estimate_quantity: estimate,
                    required_quantity: None,
                    variance: None,
                    variance_amount: None,
                    variance_type: None,
                    material_status,
                    cost_impact: 0.0,
                    current_specification,
                    documentation_note: "Total eave length is required to verify starter strip coverage. Please provide \
                         a roof measurement report including eave lengths."
                        .to_string(),
                    evidence_references: evidence,
                    analyzed_at: Utc::now(),
                },
                analysis_path: StarterStripPath::EavesNotMeasured,
                roof_type,
                starter_type,
                line_items_found: items.len(),
            });
        };

        let default_rate = self.default_unit_price;
        let (path, variance, rate) = if items.is_empty() {
            (
                StarterStripPath::MissingMaterial,
                Variance::classify(0.0, eaves, 0.0, EXCESS_THRESHOLD_LF),
                default_rate,
            )
        } else if cut_on_laminated {
            // cut material counts for nothing; the whole eave run is replaced
            (
                StarterStripPath::CutFromWaste,
                Variance::classify(0.0, eaves, 0.0, EXCESS_THRESHOLD_LF),
                default_rate,
            )
        } else {
            (
                StarterStripPath::QuantityCheck,
                Variance::classify(estimate, eaves, SHORTAGE_TOLERANCE_LF, EXCESS_THRESHOLD_LF),
                first_unit_price(items.iter().copied()).unwrap_or(default_rate),
            )
        };

        let billed_length = variance.shortfall();
        let cost_impact = ensure_finite(
            "starter strip cost impact",
            safe_multiply(billed_length, rate, DEFAULT_DECIMALS),
        )?;
        let status = if variance.kind == VarianceType::Shortage && billed_length > 0.0 {
            ComplianceStatus::SupplementNeeded
        } else {
            ComplianceStatus::Compliant
        };

        tracing::debug!(
            job_id = %input.job_id,
            roof_type = %roof_type,
            path = ?path,
            estimate,
            eaves,
            status = %status,
            "Evaluated starter strip"
        );

        let reasoning = match path {
            StarterStripPath::MissingMaterial => format!(
                "No starter strip line item was found. Starter is required along all {} of eaves; at {}/LF the missing \
                 material adds {}.",
                format_measurement(eaves, "LF"),
                format_currency(rate),
                format_currency(cost_impact),
            ),
            StarterStripPath::CutFromWaste => format!(
                "The estimate specifies starter cut from waste shingles ({}) on a laminated roof. Laminated shingles need a \
                 universal starter product with a factory sealant strip; replacing the full {} of eaves at {}/LF adds {}.",
                format_measurement(estimate, "LF"),
                format_measurement(eaves, "LF"),
                format_currency(rate),
                format_currency(cost_impact),
            ),
            _ => match variance.kind {
                VarianceType::Shortage => format!(
                    "The estimate carries {} of starter against {} of eaves, a variance of {} beyond the {} tolerance. The \
                     shortfall at {}/LF adds {}.",
                    format_measurement(estimate, "LF"),
                    format_measurement(eaves, "LF"),
                    format_signed_measurement(variance.amount, "LF"),
                    format_measurement(SHORTAGE_TOLERANCE_LF, "LF"),
                    format_currency(rate),
                    format_currency(cost_impact),
                ),
                VarianceType::Excess => format!(
                    "The estimate carries {} of starter against {} of eaves ({}). Coverage is complete; the excess is noted \
                     for review.",
                    format_measurement(estimate, "LF"),
                    format_measurement(eaves, "LF"),
                    format_signed_measurement(variance.amount, "LF"),
                ),
                VarianceType::Adequate => format!(
                    "The estimate carries {} of starter against {} of eaves ({}), within tolerance.",
                    format_measurement(estimate, "LF"),
                    format_measurement(eaves, "LF"),
                    format_signed_measurement(variance.amount, "LF"),
                ),
            },
        };

        let documentation_note = if status == ComplianceStatus::SupplementNeeded {
            let product = if roof_type == RoofType::Laminated {
                "universal starter strip"
            } else {
                "starter strip"
            };
            format!(
                "Manufacturer installation instructions require a starter course along all eaves. The measurement report \
                 shows {} of eaves. We request {} of {} at {}/LF, totaling {}.",
                format_measurement(eaves, "LF"),
                format_measurement(billed_length, "LF"),
                product,
                format_currency(rate),
                format_currency(cost_impact),
            )
        } else {
            format!(
                "Starter strip on the estimate ({}) covers the measured eaves ({}).",
                format_measurement(estimate, "LF"),
                format_measurement(eaves, "LF"),
            )
        };

        evidence.push(measurement_evidence(
            measurements,
            &format!("eaves {}", format_measurement(eaves, "LF")),
        ));

        Ok(StarterStripAnalysis {
            result: ComplianceResult {
                status,
                confidence: confidence(input, starter_type),
                reasoning,
                unit: "LF".to_string(),
                estimate_quantity: estimate,
                required_quantity: Some(eaves),
                variance: Some(format_signed_measurement(variance.amount, "LF")),
                variance_amount: Some(variance.amount),
                variance_type: Some(variance.kind),
                material_status,
                cost_impact,
                current_specification,
                documentation_note,
                evidence_references: evidence,
                analyzed_at: Utc::now(),
            },
            analysis_path: path,
            roof_type,
            starter_type,
            line_items_found: items.len(),
        })
    }
}

fn confidence(input: &AnalysisInput, starter_type: Option<StarterType>) -> f64 {
    let mut confidence: f64 = 0.85;
    if starter_type == Some(StarterType::Unspecified) {
        confidence -= 0.05;
    }
    match &input.roof_type {
        Some(c) if c.confidence < 0.5 => confidence -= 0.1,
        Some(_) => {}
        None => confidence -= 0.05,
    }
    if let Some(m) = input.measurements() {
        confidence += match m.extracted_from {
            MeasurementSource::Eagleview => 0.05,
            MeasurementSource::ManualReport => 0.0,
            MeasurementSource::Other => -0.05,
        };
    }
    clamp_confidence(confidence, 0.5, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measurements::RoofMeasurements;
    use crate::rules::test_support::*;
    use pretty_assertions::assert_eq;

    fn eaves(length: f64) -> Option<RoofMeasurements> {
        Some(RoofMeasurements {
            total_eaves: Some(length),
            ..eagleview()
        })
    }

    fn run(
        line_items: Vec<LineItem>,
        measurements: Option<RoofMeasurements>,
        roof_type: Option<RoofType>,
    ) -> StarterStripAnalysis {
        let input = input(line_items, measurements, roof_type);
        match StarterStripRule::default().evaluate(&input).unwrap() {
            RuleAnalysis::StarterStrip(a) => a,
            other => panic!("unexpected analysis {:?}", other.rule_type()),
        }
    }

    #[test]
    fn universal_starter_covering_eaves_is_compliant() {
        let analysis = run(
            vec![item("Starter strip - universal", 120.0, "LF", Some(2.85))],
            eaves(120.0),
            Some(RoofType::Laminated),
        );
        assert_eq!(analysis.result.status, ComplianceStatus::Compliant);
        assert_eq!(analysis.starter_type, Some(StarterType::Universal));
        assert_eq!(analysis.result.cost_impact, 0.0);
        assert_eq!(analysis.result.confidence, 0.9);
    }

    #[test]
    fn missing_starter_bills_all_eaves() {
        let analysis = run(vec![], eaves(150.0), Some(RoofType::Laminated));
        assert_eq!(analysis.analysis_path, StarterStripPath::MissingMaterial);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.cost_impact, 427.5);
        assert_eq!(analysis.result.variance_amount, Some(-150.0));
        assert_eq!(analysis.result.material_status, MaterialStatus::NonCompliant);
    }

    #[test]
    fn cut_starter_on_laminated_needs_universal_product() {
        let analysis = run(
            vec![item("Starter - cut from 3 tab", 150.0, "LF", Some(1.10))],
            eaves(150.0),
            Some(RoofType::Laminated),
        );
        assert_eq!(analysis.analysis_path, StarterStripPath::CutFromWaste);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Shortage));
        assert_eq!(analysis.result.variance_amount, Some(-150.0));
        assert_eq!(analysis.result.cost_impact, 427.5);
    }

    #[test]
    fn cut_starter_on_three_tab_is_accepted() {
        let analysis = run(
            vec![item("Starter - cut from 3 tab", 150.0, "LF", Some(1.10))],
            eaves(150.0),
            Some(RoofType::ThreeTab),
        );
        assert_eq!(analysis.analysis_path, StarterStripPath::QuantityCheck);
        assert_eq!(analysis.result.status, ComplianceStatus::Compliant);
        assert_eq!(analysis.result.material_status, MaterialStatus::Compliant);
    }

    #[test]
    fn short_starter_bills_shortfall_at_item_price() {
        let analysis = run(
            vec![item("Universal starter course", 100.0, "LF", Some(2.85))],
            eaves(150.0),
            Some(RoofType::Laminated),
        );
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.variance.as_deref(), Some("-50 LF"));
        assert_eq!(analysis.result.cost_impact, 142.5);
    }

    #[test]
    fn missing_eaves_is_insufficient_data() {
        let analysis = run(
            vec![item("Starter strip", 100.0, "LF", Some(2.85))],
            Some(eagleview()),
            Some(RoofType::Laminated),
        );
        assert_eq!(analysis.analysis_path, StarterStripPath::EavesNotMeasured);
        assert_eq!(analysis.result.status, ComplianceStatus::InsufficientData);
        assert_eq!(analysis.result.required_quantity, None);
        assert_eq!(analysis.starter_type, Some(StarterType::Unspecified));
    }
}
