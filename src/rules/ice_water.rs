//! Ice and water barrier rule
//!
//! Eave protection must run from the eave edge to 24" inside the exterior
//! wall line, measured along the slope. The required width is
//!
//! ```text
//! (soffit depth + wall thickness + 24") x sqrt(1 + (rise/run)^2) x (1 + margin)
//! ```
//!
//! and the required area is total eave length times that width. Soffit depth
//! and wall thickness are not on measurement reports, so they fall back to
//! [`EaveGeometry`] defaults and the result says so.

use chrono::Utc;

use super::precision::{
    format_currency, format_measurement, format_number, format_signed_measurement,
    round_to_precision, safe_multiply, DEFAULT_DECIMALS,
};
use super::{
    clamp_confidence, ensure_finite, line_item_evidence, measurement_evidence, mentions_any,
    AnalysisInput, ComplianceRule, EaveGeometry, RuleError, Variance,
};
use crate::domain::analysis::{
    ComplianceResult, ComplianceStatus, CurrentSpecification, IceWaterAnalysis,
    IceWaterCalculation, IceWaterPath, LineItemSnapshot, MaterialStatus, RuleAnalysis,
    VarianceType,
};
use crate::domain::estimate::LineItem;
use crate::domain::measurements::MeasurementSource;
use crate::domain::progress::RuleType;

/// Excess beyond this many SF is noted but not billed
pub const EXCESS_THRESHOLD_SF: f64 = 100.0;
/// Width of a standard membrane roll, used to convert LF quantities to SF
pub const ROLL_WIDTH_FT: f64 = 3.0;

const ICE_WATER_KEYWORDS: &[&str] = &[
    "ice & water",
    "ice and water",
    "ice/water",
    "ice & wtr",
    "i&w",
    "ice shield",
    "ice barrier",
    "rfg iws",
];

/// Slope factor for a pitch such as "6/12", "6:12" or a bare rise "6"
///
/// Returns None when the pitch cannot be read.
pub fn pitch_multiplier(pitch: &str) -> Option<f64> {
    let cleaned = pitch.trim().to_lowercase().replace("pitch", "");
    let cleaned = cleaned.trim();
    let (rise, run) = match cleaned.split_once(['/', ':']) {
        Some((rise, run)) => (rise.trim().parse::<f64>().ok()?, run.trim().parse::<f64>().ok()?),
        None => (cleaned.parse::<f64>().ok()?, 12.0),
    };
    if !rise.is_finite() || !run.is_finite() || rise < 0.0 || run <= 0.0 {
        return None;
    }
    let slope = rise / run;
    Some((1.0 + slope * slope).sqrt())
}

/// Required membrane width in inches
pub fn required_coverage_width(geometry: &EaveGeometry, pitch_multiplier: f64) -> f64 {
    (geometry.soffit_depth_in + geometry.wall_thickness_in + geometry.code_minimum_in)
        * pitch_multiplier
        * (1.0 + geometry.safety_margin)
}

pub struct IceWaterRule {
    unit_price_per_sf: f64,
    geometry: EaveGeometry,
}

impl IceWaterRule {
    pub fn new(unit_price_per_sf: f64, geometry: EaveGeometry) -> Self {
        Self {
            unit_price_per_sf,
            geometry,
        }
    }
}

impl Default for IceWaterRule {
    fn default() -> Self {
        Self::new(
            super::RulePricing::default().ice_water_per_sf,
            EaveGeometry::default(),
        )
    }
}

impl ComplianceRule for IceWaterRule {
    fn rule_type(&self) -> RuleType {
        RuleType::IceAndWater
    }

    fn evaluate(&self, input: &AnalysisInput) -> Result<RuleAnalysis, RuleError> {
        input.validate()?;
        self.analyze(input).map(RuleAnalysis::IceAndWater)
    }
}

/// Membrane area an item provides, in SF
fn item_square_feet(item: &LineItem) -> f64 {
    let value = item.quantity.value.max(0.0);
    match item.quantity.unit_code().as_str() {
        "SQ" => value * 100.0,
        "LF" => value * ROLL_WIDTH_FT,
        _ => value,
    }
}

impl IceWaterRule {
    fn calculate(&self, eave_length_ft: f64, pitch: Option<&str>) -> Result<IceWaterCalculation, RuleError> {
        let multiplier = pitch.and_then(pitch_multiplier);
        let pitch_multiplier = multiplier.unwrap_or(1.0);
        let width_in = required_coverage_width(&self.geometry, pitch_multiplier);
        let required_sf = ensure_finite(
            "required ice and water area",
            safe_multiply(eave_length_ft, width_in / 12.0, DEFAULT_DECIMALS),
        )?;

        Ok(IceWaterCalculation {
            soffit_depth_in: self.geometry.soffit_depth_in,
            wall_thickness_in: self.geometry.wall_thickness_in,
            code_minimum_in: self.geometry.code_minimum_in,
            pitch: multiplier.and(pitch.map(str::to_string)),
            pitch_multiplier: round_to_precision(pitch_multiplier, 4),
            safety_margin: self.geometry.safety_margin,
            required_width_in: round_to_precision(width_in, DEFAULT_DECIMALS),
            eave_length_ft,
            required_sf,
            default_geometry: true,
        })
    }

    fn analyze(&self, input: &AnalysisInput) -> Result<IceWaterAnalysis, RuleError> {
        let measurements = input.measurements();
        let items: Vec<&LineItem> = input
            .line_items
            .iter()
            .filter(|i| mentions_any(i, ICE_WATER_KEYWORDS))
            .collect();
        let actual_sf = items.iter().fold(0.0, |acc, item| {
            round_to_precision(acc + item_square_feet(item), DEFAULT_DECIMALS)
        });
        let mut evidence: Vec<String> = items.iter().map(|i| line_item_evidence(i)).collect();
        let current_specification = items
            .first()
            .map(|item| CurrentSpecification::Single(LineItemSnapshot::from(*item)));

        let Some(eave_length) = measurements.and_then(|m| m.eaves()) else {
            evidence.push(measurement_evidence(measurements, "eave length not reported"));
            tracing::debug!(job_id = %input.job_id, "Ice and water: eave length unavailable");
            return Ok(IceWaterAnalysis {
                result: ComplianceResult {
                    status: ComplianceStatus::InsufficientData,
                    confidence: 0.15,
                    reasoning: format!(
                        "Eave length is not available from the measurement report, so the required ice and water barrier \
                         coverage cannot be calculated. The estimate carries {} of ice and water barrier.",
                        format_measurement(actual_sf, "SF")
                    ),
                    unit: "SF".to_string(),
                    estimate_quantity: actual_sf,
                    required_quantity: None,
                    variance: None,
                    variance_amount: None,
                    variance_type: None,
                    material_status: if items.is_empty() {
                        MaterialStatus::NonCompliant
                    } else {
                        MaterialStatus::Compliant
                    },
                    cost_impact: 0.0,
                    current_specification,
                    documentation_note: "Total eave length is required to calculate code-required ice and water barrier \
                         coverage. Please provide a roof measurement report including eave lengths."
                        .to_string(),
                    evidence_references: evidence,
                    analyzed_at: Utc::now(),
                },
                analysis_path: IceWaterPath::EavesNotMeasured,
                calculation: None,
                line_items_found: items.len(),
            });
        };

        let pitch = measurements.and_then(|m| m.predominant_pitch.as_deref());
        let calculation = self.calculate(eave_length, pitch)?;
        let required_sf = calculation.required_sf;
        let rate = self.unit_price_per_sf;

        let (path, variance) = if items.is_empty() {
            (
                IceWaterPath::MissingMaterial,
                Variance::classify(0.0, required_sf, 0.0, EXCESS_THRESHOLD_SF),
            )
        } else {
            (
                IceWaterPath::CoverageCheck,
                Variance::classify(
                    actual_sf,
                    required_sf,
                    self.geometry.tolerance_sf,
                    EXCESS_THRESHOLD_SF,
                ),
            )
        };
        let cost_impact = ensure_finite(
            "ice and water cost impact",
            safe_multiply(variance.shortfall(), rate, DEFAULT_DECIMALS),
        )?;
        let status = if variance.kind == VarianceType::Shortage {
            ComplianceStatus::SupplementNeeded
        } else {
            ComplianceStatus::Compliant
        };

        tracing::debug!(
            job_id = %input.job_id,
            eave_length_ft = eave_length,
            required_sf,
            actual_sf,
            status = %status,
            "Evaluated ice and water barrier"
        );

        let calc_text = format!(
            "Required width is ({}\" soffit + {}\" wall + {}\" code minimum) x {} pitch factor{} x {} safety margin = {}\"; \
             over {} of eaves that is {}.",
            format_number(calculation.soffit_depth_in, 2, true),
            format_number(calculation.wall_thickness_in, 2, true),
            format_number(calculation.code_minimum_in, 2, true),
            format_number(calculation.pitch_multiplier, 3, true),
            match &calculation.pitch {
                Some(p) => format!(" ({})", p),
                None => " (pitch not reported, slope ignored)".to_string(),
            },
            format_number(1.0 + calculation.safety_margin, 2, true),
            format_number(calculation.required_width_in, 2, true),
            format_measurement(eave_length, "LF"),
            format_measurement(required_sf, "SF"),
        );

        let reasoning = match (path, variance.kind) {
            (IceWaterPath::MissingMaterial, _) => format!(
                "{} No ice and water barrier line item was found; the full {} is needed at {}/SF, a cost impact of {}.",
                calc_text,
                format_measurement(required_sf, "SF"),
                format_currency(rate),
                format_currency(cost_impact),
            ),
            (_, VarianceType::Shortage) => format!(
                "{} The estimate carries {}, short by {} (beyond the {} tolerance); the shortfall at {}/SF adds {}.",
                calc_text,
                format_measurement(actual_sf, "SF"),
                format_measurement(variance.shortfall(), "SF"),
                format_measurement(self.geometry.tolerance_sf, "SF"),
                format_currency(rate),
                format_currency(cost_impact),
            ),
            (_, VarianceType::Excess) => format!(
                "{} The estimate carries {}, {} over the requirement; coverage is complete and the excess is noted for review.",
                calc_text,
                format_measurement(actual_sf, "SF"),
                format_measurement(variance.amount, "SF"),
            ),
            (_, VarianceType::Adequate) => format!(
                "{} The estimate carries {} ({} variance), within the {} tolerance.",
                calc_text,
                format_measurement(actual_sf, "SF"),
                format_signed_measurement(variance.amount, "SF"),
                format_measurement(self.geometry.tolerance_sf, "SF"),
            ),
        };

        let geometry_caveat = format!(
            "Soffit depth ({}\") and wall thickness ({}\") were not measured and use standard values; field verification may \
             increase the requirement.",
            format_number(calculation.soffit_depth_in, 2, true),
            format_number(calculation.wall_thickness_in, 2, true),
        );
        let documentation_note = if status == ComplianceStatus::SupplementNeeded {
            format!(
                "Building code (IRC R905.1.2) requires an ice barrier extending from the lowest edge of all roof surfaces to a \
                 point at least 24 inches inside the exterior wall line. Measured along the slope, this requires {} of coverage \
                 across {} of eaves. We request a supplement of {} of ice and water barrier at {}/SF, totaling {}. {}",
                format_measurement(required_sf, "SF"),
                format_measurement(eave_length, "LF"),
                format_measurement(variance.shortfall(), "SF"),
                format_currency(rate),
                format_currency(cost_impact),
                geometry_caveat,
            )
        } else {
            format!(
                "Ice and water barrier on the estimate ({}) meets the calculated eave-protection requirement ({}). {}",
                format_measurement(actual_sf, "SF"),
                format_measurement(required_sf, "SF"),
                geometry_caveat,
            )
        };

        evidence.push(measurement_evidence(
            measurements,
            &format!(
                "eaves {}, pitch {}",
                format_measurement(eave_length, "LF"),
                pitch.unwrap_or("not reported")
            ),
        ));

        Ok(IceWaterAnalysis {
            result: ComplianceResult {
                status,
                confidence: confidence(input, &calculation),
                reasoning,
                unit: "SF".to_string(),
                estimate_quantity: actual_sf,
                required_quantity: Some(required_sf),
                variance: Some(format_signed_measurement(variance.amount, "SF")),
                variance_amount: Some(variance.amount),
                variance_type: Some(variance.kind),
                material_status: if items.is_empty() {
                    MaterialStatus::NonCompliant
                } else {
                    MaterialStatus::Compliant
                },
                cost_impact,
                current_specification,
                documentation_note,
                evidence_references: evidence,
                analyzed_at: Utc::now(),
            },
            analysis_path: path,
            calculation: Some(calculation),
            line_items_found: items.len(),
        })
    }
}

fn confidence(input: &AnalysisInput, calculation: &IceWaterCalculation) -> f64 {
    let mut confidence: f64 = 0.85;
    if calculation.pitch.is_none() {
        confidence -= 0.1;
    }
    if calculation.default_geometry {
        confidence -= 0.05;
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

    fn eaves(length: Option<f64>, pitch: &str) -> RoofMeasurements {
        RoofMeasurements {
            eave_length: length,
            predominant_pitch: Some(pitch.to_string()),
            ..eagleview()
        }
    }

    fn run(line_items: Vec<LineItem>, measurements: Option<RoofMeasurements>) -> IceWaterAnalysis {
        let input = input(line_items, measurements, None);
        match IceWaterRule::default().evaluate(&input).unwrap() {
            RuleAnalysis::IceAndWater(a) => a,
            other => panic!("unexpected analysis {:?}", other.rule_type()),
        }
    }

    #[test]
    fn pitch_multiplier_matches_slope_geometry() {
        assert!((pitch_multiplier("12/12").unwrap() - 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(pitch_multiplier("0/12"), Some(1.0));
        assert!((pitch_multiplier("6/12").unwrap() - 1.25f64.sqrt()).abs() < 1e-9);
        assert!((pitch_multiplier("6:12").unwrap() - 1.25f64.sqrt()).abs() < 1e-9);
        assert!((pitch_multiplier(" 6 / 12 pitch").unwrap() - 1.25f64.sqrt()).abs() < 1e-9);
        assert!((pitch_multiplier("6").unwrap() - 1.25f64.sqrt()).abs() < 1e-9);
        assert_eq!(pitch_multiplier("steep"), None);
        assert_eq!(pitch_multiplier("6/0"), None);
    }

    #[test]
    fn coverage_width_includes_margin() {
        let width = required_coverage_width(&EaveGeometry::default(), 1.0);
        assert!((width - 44.1).abs() < 1e-9);
    }

    #[test]
    fn missing_eave_length_is_insufficient_never_zero() {
        let analysis = run(
            vec![item("Ice & water barrier", 200.0, "SF", Some(1.85))],
            Some(eaves(None, "6/12")),
        );
        assert_eq!(analysis.result.status, ComplianceStatus::InsufficientData);
        assert_eq!(analysis.result.required_quantity, None);
        assert!(analysis.calculation.is_none());
        assert!(analysis.result.confidence <= 0.3);

        let analysis = run(vec![], None);
        assert_eq!(analysis.result.status, ComplianceStatus::InsufficientData);
    }

    #[test]
    fn missing_barrier_bills_full_coverage() {
        let analysis = run(vec![], Some(eaves(Some(100.0), "0/12")));

        assert_eq!(analysis.analysis_path, IceWaterPath::MissingMaterial);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.required_quantity, Some(367.5));
        assert_eq!(analysis.result.cost_impact, 679.88);
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Shortage));
    }

    #[test]
    fn shortfall_within_tolerance_is_compliant() {
        let analysis = run(
            vec![item("Ice & water barrier", 350.0, "SF", Some(1.85))],
            Some(eaves(Some(100.0), "0/12")),
        );
        assert_eq!(analysis.result.status, ComplianceStatus::Compliant);
        assert_eq!(analysis.result.variance_amount, Some(-17.5));
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Adequate));
        assert_eq!(analysis.result.cost_impact, 0.0);
    }

    #[test]
    fn shortfall_beyond_tolerance_bills_the_difference() {
        let analysis = run(
            vec![item("Ice and water shield", 2.0, "SQ", Some(185.0))],
            Some(eaves(Some(100.0), "0/12")),
        );
        assert_eq!(analysis.result.estimate_quantity, 200.0);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.variance_amount, Some(-167.5));
        assert_eq!(analysis.result.cost_impact, 309.88);
    }

    #[test]
    fn steeper_pitch_raises_the_requirement() {
        let flat = run(vec![], Some(eaves(Some(100.0), "0/12")));
        let steep = run(vec![], Some(eaves(Some(100.0), "12/12")));
        assert!(steep.result.required_quantity > flat.result.required_quantity);
        assert_eq!(steep.calculation.unwrap().pitch_multiplier, 1.4142);
    }

    #[test]
    fn unreadable_pitch_is_flagged_and_lowers_confidence() {
        let known = run(vec![], Some(eaves(Some(100.0), "0/12")));
        let unknown = run(vec![], Some(eaves(Some(100.0), "unknown")));
        let calculation = unknown.calculation.as_ref().unwrap();
        assert!(calculation.pitch.is_none());
        assert_eq!(calculation.pitch_multiplier, 1.0);
        assert!(unknown.result.confidence < known.result.confidence);
        assert!(unknown.result.reasoning.contains("pitch not reported"));
    }

    #[test]
    fn documentation_flags_assumed_geometry() {
        let analysis = run(vec![], Some(eaves(Some(100.0), "6/12")));
        assert!(analysis.calculation.unwrap().default_geometry);
        assert!(analysis.result.documentation_note.contains("were not measured"));
    }
}
