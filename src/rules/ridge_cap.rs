//! Ridge cap rule
//!
//! Routes by roof type first (laminated, 3-tab, other), checks that ridge
//! cap material is present and of an acceptable product, then compares the
//! estimated length with the measured ridge/hip length.

use chrono::Utc;

use super::precision::{
    format_currency, format_measurement, format_signed_measurement, safe_add, safe_multiply,
    DEFAULT_DECIMALS,
};
use super::{
    clamp_confidence, ensure_finite, first_unit_price, line_item_evidence, measurement_evidence,
    mentions_any, total_quantity, AnalysisInput, ComplianceRule, RuleError, Variance,
};
use crate::domain::analysis::{
    ComplianceResult, ComplianceStatus, CurrentSpecification, LineItemSnapshot, MaterialStatus,
    RequiredLengthSource, RidgeCapAnalysis, RidgeCapPath, RuleAnalysis, VarianceType,
};
use crate::domain::estimate::{LineItem, RidgeCapQuality};
use crate::domain::measurements::{MeasurementSource, RoofMeasurements, RoofType};
use crate::domain::progress::RuleType;

/// Shortage beyond this many LF needs a supplement
pub const SHORTAGE_TOLERANCE_LF: f64 = 5.0;
/// Excess beyond this many LF is flagged in the reasoning but not billed
pub const EXCESS_THRESHOLD_LF: f64 = 20.0;
/// Ridge/hip length per SF of roof area when only area is known
pub const AREA_FACTOR: f64 = 0.05;
/// Length assumed when no geometry at all is available
pub const FALLBACK_LENGTH_LF: f64 = 100.0;

const RIDGE_KEYWORDS: &[&str] = &["ridge cap", "hip & ridge", "hip and ridge", "hip/ridge", "ridgc"];

pub struct RidgeCapRule {
    default_unit_price: f64,
}

impl RidgeCapRule {
    pub fn new(default_unit_price: f64) -> Self {
        Self { default_unit_price }
    }
}

impl Default for RidgeCapRule {
    fn default() -> Self {
        Self::new(super::RulePricing::default().ridge_cap_per_lf)
    }
}

impl ComplianceRule for RidgeCapRule {
    fn rule_type(&self) -> RuleType {
        RuleType::RidgeCap
    }

    fn evaluate(&self, input: &AnalysisInput) -> Result<RuleAnalysis, RuleError> {
        input.validate()?;
        self.analyze(input).map(RuleAnalysis::RidgeCap)
    }
}

/// Worst quality among the matched items; cut-from-3tab wins over anything else
fn effective_quality(items: &[&LineItem]) -> Option<RidgeCapQuality> {
    let qualities: Vec<RidgeCapQuality> = items.iter().filter_map(|i| item_quality(i)).collect();
    if qualities.contains(&RidgeCapQuality::CutFrom3Tab) {
        return Some(RidgeCapQuality::CutFrom3Tab);
    }
    qualities
        .iter()
        .copied()
        .find(|q| *q != RidgeCapQuality::Unknown)
        .or_else(|| qualities.first().copied())
}

fn item_quality(item: &LineItem) -> Option<RidgeCapQuality> {
    match item.ridge_cap_quality {
        Some(quality) if quality != RidgeCapQuality::Unknown => Some(quality),
        other => {
            let text = item.search_text();
            let cut = text.contains("cut");
            let three_tab =
                text.contains("3-tab") || text.contains("3 tab") || text.contains("three tab");
            if cut && three_tab {
                Some(RidgeCapQuality::CutFrom3Tab)
            } else if text.contains("high profile") || text.contains("high-profile") {
                Some(RidgeCapQuality::HighProfile)
            } else {
                other
            }
        }
    }
}

pub(crate) fn is_ridge_cap_item(item: &LineItem) -> bool {
    item.is_ridge_cap_item || mentions_any(item, RIDGE_KEYWORDS)
}

/// Required ridge/hip length and where it came from
pub fn required_length(measurements: Option<&RoofMeasurements>) -> (f64, RequiredLengthSource) {
    let Some(m) = measurements else {
        return (FALLBACK_LENGTH_LF, RequiredLengthSource::Fallback);
    };

    if let Some(total) = m.total_ridge_hip {
        return (total, RequiredLengthSource::TotalRidgeHip);
    }
    match (m.ridge_length, m.hip_length) {
        (Some(ridge), Some(hip)) => {
            return (
                safe_add(ridge, hip, DEFAULT_DECIMALS),
                RequiredLengthSource::RidgePlusHip,
            )
        }
        (Some(ridge), None) => return (ridge, RequiredLengthSource::RidgeOnly),
        (None, Some(hip)) => return (hip, RequiredLengthSource::HipOnly),
        (None, None) => {}
    }
    if let Some(area) = m.roof_area() {
        return (
            safe_multiply(area, AREA_FACTOR, DEFAULT_DECIMALS),
            RequiredLengthSource::RoofAreaEstimate,
        );
    }
    (FALLBACK_LENGTH_LF, RequiredLengthSource::Fallback)
}

/// Facts shared by every branch of one evaluation
struct Context<'a> {
    input: &'a AnalysisInput,
    items: Vec<&'a LineItem>,
    roof_type: RoofType,
    quality: Option<RidgeCapQuality>,
    estimate: f64,
    required: f64,
    source: RequiredLengthSource,
    unit_price: f64,
    confidence: f64,
}

impl RidgeCapRule {
    fn analyze(&self, input: &AnalysisInput) -> Result<RidgeCapAnalysis, RuleError> {
        let items: Vec<&LineItem> = input
            .line_items
            .iter()
            .filter(|i| is_ridge_cap_item(i))
            .collect();
        let (required, source) = required_length(input.measurements());
        let ctx = Context {
            roof_type: input.roof_type(),
            quality: effective_quality(&items),
            estimate: total_quantity(items.iter().copied()),
            unit_price: first_unit_price(items.iter().copied()).unwrap_or(self.default_unit_price),
            confidence: confidence(input, source),
            required,
            source,
            items,
            input,
        };

        let cut = ctx.quality == Some(RidgeCapQuality::CutFrom3Tab);
        let path = match (ctx.roof_type, ctx.items.is_empty(), cut) {
            (RoofType::Laminated, true, _) => RidgeCapPath::LaminatedMissingMaterial,
            (RoofType::Laminated, false, true) => RidgeCapPath::LaminatedIncompatibleMaterial,
            (RoofType::ThreeTab, true, _) => RidgeCapPath::ThreeTabMissingMaterial,
            (RoofType::ThreeTab, false, true) => RidgeCapPath::ThreeTabCutMaterial,
            (RoofType::Other, true, _) => RidgeCapPath::UnknownRoofMissingMaterial,
            _ => RidgeCapPath::QuantityCheck,
        };

        tracing::debug!(
            job_id = %input.job_id,
            roof_type = %ctx.roof_type,
            items = ctx.items.len(),
            required_lf = ctx.required,
            path = ?path,
            "Evaluating ridge cap"
        );

        match path {
            RidgeCapPath::QuantityCheck => self.quantity_check(&ctx),
            RidgeCapPath::LaminatedMissingMaterial
            | RidgeCapPath::ThreeTabMissingMaterial
            | RidgeCapPath::UnknownRoofMissingMaterial => self.missing_material(&ctx, path),
            RidgeCapPath::LaminatedIncompatibleMaterial | RidgeCapPath::ThreeTabCutMaterial => {
                self.cut_material(&ctx, path)
            }
        }
    }

    fn missing_material(
        &self,
        ctx: &Context<'_>,
        path: RidgeCapPath,
    ) -> Result<RidgeCapAnalysis, RuleError> {
        let variance = Variance::classify(0.0, ctx.required, 0.0, EXCESS_THRESHOLD_LF);
        let rate = self.default_unit_price;
        let cost = ensure_finite(
            "ridge cap cost impact",
            safe_multiply(ctx.required, rate, DEFAULT_DECIMALS),
        )?;

        let product = match ctx.roof_type {
            RoofType::Laminated => "purpose-built hip and ridge cap shingles compatible with the laminated field shingle",
            RoofType::ThreeTab => "hip and ridge cap shingles",
            RoofType::Other => "purpose-built hip and ridge cap (roof type could not be confirmed)",
        };

        let reasoning = format!(
            "No ridge cap line item was found on the estimate for this {} roof. The roof requires {} of ridge cap based on {}. \
             Adding {} of {} at {}/LF gives a cost impact of {}.",
            roof_label(ctx.roof_type),
            format_measurement(ctx.required, "LF"),
            ctx.source.describe(),
            format_measurement(ctx.required, "LF"),
            product,
            format_currency(rate),
            format_currency(cost),
        );
        let note = format!(
            "The estimate omits ridge cap entirely. All hip and ridge lines must be capped to complete a weather-tight installation; \
             the roof measures {} of hip and ridge. We request a supplement for {} of {} at {}/LF, totaling {}.",
            format_measurement(ctx.required, "LF"),
            format_measurement(ctx.required, "LF"),
            product,
            format_currency(rate),
            format_currency(cost),
        );

        Ok(self.build(
            ctx,
            path,
            ComplianceStatus::SupplementNeeded,
            MaterialStatus::NonCompliant,
            variance,
            cost,
            rate,
            reasoning,
            note,
        ))
    }

    fn cut_material(
        &self,
        ctx: &Context<'_>,
        path: RidgeCapPath,
    ) -> Result<RidgeCapAnalysis, RuleError> {
        let variance =
            Variance::classify(ctx.estimate, ctx.required, SHORTAGE_TOLERANCE_LF, EXCESS_THRESHOLD_LF);
        let rate = self.default_unit_price;
        let cost = ensure_finite(
            "ridge cap cost impact",
            safe_multiply(ctx.required, rate, DEFAULT_DECIMALS),
        )?;

        let (reasoning, note) = if path == RidgeCapPath::LaminatedIncompatibleMaterial {
            (
                format!(
                    "The estimate carries {} of ridge cap cut from 3-tab shingles on a laminated roof. Laminated shingles require \
                     purpose-built hip and ridge cap; cut 3-tab pieces do not match the thickness or profile of the field shingle. \
                     Replacing the full {} requirement ({}) with purpose-built cap at {}/LF gives a cost impact of {}.",
                    format_measurement(ctx.estimate, "LF"),
                    format_measurement(ctx.required, "LF"),
                    ctx.source.describe(),
                    format_currency(rate),
                    format_currency(cost),
                ),
                format!(
                    "Manufacturer installation instructions for laminated (architectural) shingles specify purpose-built hip and ridge \
                     cap shingles. Ridge cap cut from 3-tab shingles is not an approved application for this product and may void the \
                     manufacturer warranty. We request that the ridge cap line be revised to {} of purpose-built hip and ridge cap at \
                     {}/LF, totaling {}.",
                    format_measurement(ctx.required, "LF"),
                    format_currency(rate),
                    format_currency(cost),
                ),
            )
        } else {
            (
                format!(
                    "The estimate carries {} of ridge cap cut from 3-tab shingles on a 3-tab roof. Cut ridge is acceptable on 3-tab \
                     roofs but an upgrade to purpose-built cap is recommended for the {} requirement ({}); at {}/LF the upgrade is {}.",
                    format_measurement(ctx.estimate, "LF"),
                    format_measurement(ctx.required, "LF"),
                    ctx.source.describe(),
                    format_currency(rate),
                    format_currency(cost),
                ),
                format!(
                    "Ridge cap on this 3-tab roof is specified as cut from field shingles. Purpose-built hip and ridge cap provides \
                     the manufacturer-rated wind resistance and sealant strip alignment. We recommend a supplement for {} of \
                     purpose-built hip and ridge cap at {}/LF, totaling {}.",
                    format_measurement(ctx.required, "LF"),
                    format_currency(rate),
                    format_currency(cost),
                ),
            )
        };

        Ok(self.build(
            ctx,
            path,
            ComplianceStatus::SupplementNeeded,
            MaterialStatus::NonCompliant,
            variance,
            cost,
            rate,
            reasoning,
            note,
        ))
    }

    fn quantity_check(&self, ctx: &Context<'_>) -> Result<RidgeCapAnalysis, RuleError> {
        let variance =
            Variance::classify(ctx.estimate, ctx.required, SHORTAGE_TOLERANCE_LF, EXCESS_THRESHOLD_LF);
        let rate = ctx.unit_price;
        let cost = ensure_finite(
            "ridge cap cost impact",
            safe_multiply(variance.shortfall(), rate, DEFAULT_DECIMALS),
        )?;

        let comparison = format!(
            "The estimate includes {} of ridge cap against {} required, based on {}{}.",
            format_measurement(ctx.estimate, "LF"),
            format_measurement(ctx.required, "LF"),
            ctx.source.describe(),
            geometry_detail(ctx.input.measurements(), ctx.source),
        );

        let (status, reasoning, note) = match variance.kind {
            VarianceType::Shortage => (
                ComplianceStatus::SupplementNeeded,
                format!(
                    "{} The estimate is short by {}, beyond the {} tolerance; the shortfall at {}/LF adds {}.",
                    comparison,
                    format_measurement(variance.shortfall(), "LF"),
                    format_measurement(SHORTAGE_TOLERANCE_LF, "LF"),
                    format_currency(rate),
                    format_currency(cost),
                ),
                format!(
                    "Ridge cap on the estimate ({}) does not cover the measured hip and ridge lines ({}). We request a supplement for \
                     the remaining {} of ridge cap at {}/LF, totaling {}.",
                    format_measurement(ctx.estimate, "LF"),
                    format_measurement(ctx.required, "LF"),
                    format_measurement(variance.shortfall(), "LF"),
                    format_currency(rate),
                    format_currency(cost),
                ),
            ),
            VarianceType::Excess => (
                ComplianceStatus::Compliant,
                format!(
                    "{} The estimate exceeds the requirement by {}, more than the {} review threshold. Coverage is complete; the \
                     excess is noted for review but carries no supplement.",
                    comparison,
                    format_measurement(variance.amount, "LF"),
                    format_measurement(EXCESS_THRESHOLD_LF, "LF"),
                ),
                format!(
                    "Ridge cap quantity ({}) exceeds the measured hip and ridge length ({}). No supplement is required.",
                    format_measurement(ctx.estimate, "LF"),
                    format_measurement(ctx.required, "LF"),
                ),
            ),
            VarianceType::Adequate => (
                ComplianceStatus::Compliant,
                format!(
                    "{} The variance of {} is within tolerance and the ridge cap material is acceptable for a {} roof.",
                    comparison,
                    format_signed_measurement(variance.amount, "LF"),
                    roof_label(ctx.roof_type),
                ),
                format!(
                    "Ridge cap quantity ({}) and material meet the measured requirement ({}). No supplement is required.",
                    format_measurement(ctx.estimate, "LF"),
                    format_measurement(ctx.required, "LF"),
                ),
            ),
        };

        Ok(self.build(
            ctx,
            RidgeCapPath::QuantityCheck,
            status,
            MaterialStatus::Compliant,
            variance,
            cost,
            rate,
            reasoning,
            note,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        ctx: &Context<'_>,
        path: RidgeCapPath,
        status: ComplianceStatus,
        material_status: MaterialStatus,
        variance: Variance,
        cost_impact: f64,
        unit_price: f64,
        reasoning: String,
        documentation_note: String,
    ) -> RidgeCapAnalysis {
        let mut evidence: Vec<String> = ctx.items.iter().map(|i| line_item_evidence(i)).collect();
        evidence.push(measurement_evidence(
            ctx.input.measurements(),
            &format!(
                "{} required ({})",
                format_measurement(ctx.required, "LF"),
                ctx.source.describe()
            ),
        ));
        if let Some(classification) = &ctx.input.roof_type {
            evidence.push(format!(
                "Roof type classified as {} (confidence {:.2})",
                classification.roof_type, classification.confidence
            ));
        }

        RidgeCapAnalysis {
            result: ComplianceResult {
                status,
                confidence: ctx.confidence,
                reasoning,
                unit: "LF".to_string(),
                estimate_quantity: ctx.estimate,
                required_quantity: Some(ctx.required),
                variance: Some(format_signed_measurement(variance.amount, "LF")),
                variance_amount: Some(variance.amount),
                variance_type: Some(variance.kind),
                material_status,
                cost_impact,
                current_specification: ctx
                    .items
                    .first()
                    .map(|item| CurrentSpecification::Single(LineItemSnapshot::from(*item))),
                documentation_note,
                evidence_references: evidence,
                analyzed_at: Utc::now(),
            },
            analysis_path: path,
            roof_type: ctx.roof_type,
            ridge_cap_quality: ctx.quality,
            line_items_found: ctx.items.len(),
            required_source: ctx.source,
            unit_price,
        }
    }
}

fn roof_label(roof_type: RoofType) -> &'static str {
    match roof_type {
        RoofType::Laminated => "laminated",
        RoofType::ThreeTab => "3-tab",
        RoofType::Other => "unclassified",
    }
}

fn geometry_detail(measurements: Option<&RoofMeasurements>, source: RequiredLengthSource) -> String {
    let Some(m) = measurements else {
        return String::new();
    };
    match (source, m.ridge_length, m.hip_length) {
        (RequiredLengthSource::RidgePlusHip, Some(ridge), Some(hip)) => format!(
            " ({} ridge + {} hip)",
            format_measurement(ridge, "LF"),
            format_measurement(hip, "LF")
        ),
        (RequiredLengthSource::RoofAreaEstimate, _, _) => m
            .roof_area()
            .map(|area| {
                format!(
                    " ({} x {})",
                    format_measurement(area, "SF"),
                    AREA_FACTOR
                )
            })
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Starts at 0.8 and moves with measurement completeness, report source and
/// classification confidence
fn confidence(input: &AnalysisInput, source: RequiredLengthSource) -> f64 {
    let mut confidence: f64 = 0.8;

    confidence += match source {
        source if source.is_measured() => 0.1,
        RequiredLengthSource::RidgeOnly | RequiredLengthSource::HipOnly => -0.05,
        // Area estimate and fixed fallback both guess the length
        _ => -0.1,
    };

    if let Some(m) = input.measurements() {
        confidence += match m.extracted_from {
            MeasurementSource::Eagleview => 0.05,
            MeasurementSource::ManualReport => 0.0,
            MeasurementSource::Other => -0.05,
        };
    }

    confidence += match &input.roof_type {
        Some(c) if c.confidence >= 0.8 => 0.05,
        Some(c) if c.confidence < 0.5 => -0.1,
        Some(_) => 0.0,
        None => -0.05,
    };

    clamp_confidence(confidence, 0.6, 0.99)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::*;
    use pretty_assertions::assert_eq;

    fn ridge_item(quantity: f64, quality: Option<RidgeCapQuality>) -> LineItem {
        let mut item = item("Hip / Ridge cap - composition shingles", quantity, "LF", Some(42.90));
        item.is_ridge_cap_item = true;
        item.ridge_cap_quality = quality;
        item
    }

    fn ridge_hip(ridge: f64, hip: f64) -> RoofMeasurements {
        RoofMeasurements {
            ridge_length: Some(ridge),
            hip_length: Some(hip),
            ..eagleview()
        }
    }

    fn run(input: &AnalysisInput) -> RidgeCapAnalysis {
        match RidgeCapRule::default().evaluate(input).unwrap() {
            RuleAnalysis::RidgeCap(a) => a,
            other => panic!("unexpected analysis {:?}", other.rule_type()),
        }
    }

    #[test]
    fn shortage_scenario_bills_the_shortfall() {
        let input = input(
            vec![ridge_item(6.0, Some(RidgeCapQuality::PurposeBuilt))],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        let analysis = run(&input);

        assert_eq!(analysis.analysis_path, RidgeCapPath::QuantityCheck);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.required_quantity, Some(119.0));
        assert_eq!(analysis.result.variance_amount, Some(-113.0));
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Shortage));
        assert_eq!(analysis.result.cost_impact, 4847.7);
        assert_eq!(analysis.result.variance.as_deref(), Some("-113 LF"));
        assert!(analysis.result.reasoning.contains("6 LF"));
        assert!(analysis.result.reasoning.contains("119 LF"));
        assert!(analysis.result.reasoning.contains("$4,847.70"));
        assert!(analysis.result.reasoning.contains("26 LF ridge + 93 LF hip"));
    }

    #[test]
    fn laminated_without_ridge_cap_takes_missing_material_branch() {
        let input = input(
            vec![item("Laminated comp shingle", 30.0, "SQ", Some(250.0))],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        let analysis = run(&input);

        assert_eq!(analysis.analysis_path, RidgeCapPath::LaminatedMissingMaterial);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.material_status, MaterialStatus::NonCompliant);
        assert_eq!(analysis.result.estimate_quantity, 0.0);
        assert_eq!(analysis.result.cost_impact, 5105.1);
        assert!(analysis.result.current_specification.is_none());
    }

    #[test]
    fn laminated_with_cut_3tab_is_non_compliant_even_when_long_enough() {
        let input = input(
            vec![ridge_item(120.0, Some(RidgeCapQuality::CutFrom3Tab))],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        let analysis = run(&input);

        assert_eq!(analysis.analysis_path, RidgeCapPath::LaminatedIncompatibleMaterial);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.material_status, MaterialStatus::NonCompliant);
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Adequate));
        assert!(analysis.result.cost_impact > 0.0);
        assert!(analysis.result.documentation_note.contains("purpose-built"));
    }

    #[test]
    fn three_tab_with_cut_ridge_recommends_upgrade() {
        let mut cut = item("Ridge cap cut from 3-tab shingles", 119.0, "LF", Some(12.0));
        cut.is_ridge_cap_item = true;
        let input = input(vec![cut], Some(ridge_hip(26.0, 93.0)), Some(RoofType::ThreeTab));
        let analysis = run(&input);

        assert_eq!(analysis.analysis_path, RidgeCapPath::ThreeTabCutMaterial);
        assert_eq!(analysis.ridge_cap_quality, Some(RidgeCapQuality::CutFrom3Tab));
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
        assert_eq!(analysis.result.material_status, MaterialStatus::NonCompliant);
        assert!(analysis.result.reasoning.contains("upgrade"));
    }

    #[test]
    fn unknown_roof_without_items_needs_supplement() {
        let input = input(vec![], Some(ridge_hip(20.0, 0.0)), None);
        let analysis = run(&input);
        assert_eq!(analysis.analysis_path, RidgeCapPath::UnknownRoofMissingMaterial);
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
    }

    #[test]
    fn tolerance_boundary_is_exclusive_on_shortage_side() {
        let at_boundary = input(
            vec![ridge_item(114.0, Some(RidgeCapQuality::PurposeBuilt))],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        let analysis = run(&at_boundary);
        assert_eq!(analysis.result.variance_amount, Some(-5.0));
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Adequate));
        assert_eq!(analysis.result.status, ComplianceStatus::Compliant);
        assert_eq!(analysis.result.cost_impact, 0.0);

        let past_boundary = input(
            vec![ridge_item(113.99, Some(RidgeCapQuality::PurposeBuilt))],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        let analysis = run(&past_boundary);
        assert_eq!(analysis.result.variance_amount, Some(-5.01));
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Shortage));
        assert_eq!(analysis.result.status, ComplianceStatus::SupplementNeeded);
    }

    #[test]
    fn excess_is_compliant_and_not_billed() {
        let input = input(
            vec![ridge_item(150.0, None)],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        let analysis = run(&input);
        assert_eq!(analysis.result.variance_type, Some(VarianceType::Excess));
        assert_eq!(analysis.result.status, ComplianceStatus::Compliant);
        assert_eq!(analysis.result.cost_impact, 0.0);
    }

    #[test]
    fn required_length_fallback_chain() {
        let total = RoofMeasurements {
            total_ridge_hip: Some(130.0),
            ridge_length: Some(26.0),
            hip_length: Some(93.0),
            ..Default::default()
        };
        assert_eq!(
            required_length(Some(&total)),
            (130.0, RequiredLengthSource::TotalRidgeHip)
        );

        let ridge_only = RoofMeasurements {
            ridge_length: Some(26.0),
            ..Default::default()
        };
        assert_eq!(
            required_length(Some(&ridge_only)),
            (26.0, RequiredLengthSource::RidgeOnly)
        );

        let area = RoofMeasurements {
            total_roof_area: Some(2400.0),
            ..Default::default()
        };
        assert_eq!(
            required_length(Some(&area)),
            (120.0, RequiredLengthSource::RoofAreaEstimate)
        );

        assert_eq!(
            required_length(Some(&RoofMeasurements::default())),
            (FALLBACK_LENGTH_LF, RequiredLengthSource::Fallback)
        );
        assert_eq!(
            required_length(None),
            (FALLBACK_LENGTH_LF, RequiredLengthSource::Fallback)
        );
    }

    #[test]
    fn confidence_is_clamped_and_reflects_inputs() {
        let measured = input(
            vec![ridge_item(119.0, None)],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        assert_eq!(run(&measured).result.confidence, 0.99);

        let blind = input(vec![ridge_item(119.0, None)], None, None);
        assert_eq!(run(&blind).result.confidence, 0.65);

        let area_only = input(
            vec![ridge_item(119.0, None)],
            Some(RoofMeasurements {
                total_roof_area: Some(2400.0),
                ..Default::default()
            }),
            Some(RoofType::Laminated),
        );
        // 0.8 - 0.1 (area) - 0.05 (unlabelled source) + 0.05 (classification)
        assert_eq!(run(&area_only).result.confidence, 0.7);
    }

    #[test]
    fn rejects_non_finite_quantities() {
        let input = input(
            vec![ridge_item(f64::NAN, None)],
            Some(ridge_hip(26.0, 93.0)),
            Some(RoofType::Laminated),
        );
        assert!(RidgeCapRule::default().evaluate(&input).is_err());
    }
}
