//! Analysis result domain types
//!
//! Every rule produces a [`ComplianceResult`] (the shared base) wrapped in a
//! rule-specific struct, and the four are unified by the [`RuleAnalysis`]
//! tagged union so consumers can match on the rule instead of probing
//! optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::estimate::{LineItem, RidgeCapQuality};
use super::measurements::RoofType;
use super::progress::RuleType;
use crate::rules::precision::safe_add;

// ============================================================================
// Verdicts
// ============================================================================

/// Compliance verdict of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    SupplementNeeded,
    InsufficientData,
    /// Drip edge only: one edge is covered, the other is not
    Partial,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::SupplementNeeded => "SUPPLEMENT_NEEDED",
            ComplianceStatus::InsufficientData => "INSUFFICIENT_DATA",
            ComplianceStatus::Partial => "PARTIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLIANT" => Some(ComplianceStatus::Compliant),
            "SUPPLEMENT_NEEDED" => Some(ComplianceStatus::SupplementNeeded),
            "INSUFFICIENT_DATA" => Some(ComplianceStatus::InsufficientData),
            "PARTIAL" => Some(ComplianceStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of the quantity variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceType {
    Shortage,
    Adequate,
    Excess,
}

impl std::fmt::Display for VarianceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarianceType::Shortage => write!(f, "shortage"),
            VarianceType::Adequate => write!(f, "adequate"),
            VarianceType::Excess => write!(f, "excess"),
        }
    }
}

/// Whether the estimated material meets the requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaterialStatus {
    Compliant,
    NonCompliant,
}

// ============================================================================
// Current specification snapshots
// ============================================================================

/// Snapshot of a matched estimate line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemSnapshot {
    pub code: Option<String>,
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub rate: Option<f64>,
    pub total: Option<f64>,
}

impl From<&LineItem> for LineItemSnapshot {
    fn from(item: &LineItem) -> Self {
        Self {
            code: item.code.clone(),
            description: item.description.clone(),
            quantity: item.quantity.value,
            unit: item.quantity.unit.clone(),
            rate: item.unit_price,
            total: item.total(),
        }
    }
}

/// What the estimate currently carries for a rule
///
/// Drip edge tracks two features under one rule, so it gets its own variant
/// holding each side separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurrentSpecification {
    Single(LineItemSnapshot),
    Edges {
        drip_edge: Option<LineItemSnapshot>,
        gutter_apron: Option<LineItemSnapshot>,
    },
}

// ============================================================================
// Common base
// ============================================================================

/// Fields every rule result carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub status: ComplianceStatus,
    pub confidence: f64,
    pub reasoning: String,
    pub unit: String,
    pub estimate_quantity: f64,
    /// None when the requirement could not be computed
    pub required_quantity: Option<f64>,
    /// Display form of the variance, e.g. "-113 LF"
    pub variance: Option<String>,
    /// Signed; negative means the estimate is short
    pub variance_amount: Option<f64>,
    pub variance_type: Option<VarianceType>,
    pub material_status: MaterialStatus,
    pub cost_impact: f64,
    pub current_specification: Option<CurrentSpecification>,
    pub documentation_note: String,
    pub evidence_references: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}


// ============================================================================
// Rule-specific results
// ============================================================================

/// Decision-tree branch that produced a ridge cap result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RidgeCapPath {
    LaminatedMissingMaterial,
    LaminatedIncompatibleMaterial,
    ThreeTabMissingMaterial,
    ThreeTabCutMaterial,
    UnknownRoofMissingMaterial,
    QuantityCheck,
}

/// Where the ridge cap requirement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredLengthSource {
    TotalRidgeHip,
    RidgePlusHip,
    RidgeOnly,
    HipOnly,
    RoofAreaEstimate,
    Fallback,
}

impl RequiredLengthSource {
    pub fn describe(&self) -> &'static str {
        match self {
            RequiredLengthSource::TotalRidgeHip => "the reported combined ridge/hip total",
            RequiredLengthSource::RidgePlusHip => "ridge length plus hip length",
            RequiredLengthSource::RidgeOnly => "ridge length (no hip length reported)",
            RequiredLengthSource::HipOnly => "hip length (no ridge length reported)",
            RequiredLengthSource::RoofAreaEstimate => "an estimate from total roof area",
            RequiredLengthSource::Fallback => "a default length (no roof geometry reported)",
        }
    }

    /// Whether the length came straight from measured ridge/hip lines
    pub fn is_measured(&self) -> bool {
        matches!(
            self,
            RequiredLengthSource::TotalRidgeHip | RequiredLengthSource::RidgePlusHip
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeCapAnalysis {
    #[serde(flatten)]
    pub result: ComplianceResult,
    pub analysis_path: RidgeCapPath,
    pub roof_type: RoofType,
    pub ridge_cap_quality: Option<RidgeCapQuality>,
    pub line_items_found: usize,
    pub required_source: RequiredLengthSource,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarterStripPath {
    EavesNotMeasured,
    MissingMaterial,
    CutFromWaste,
    QuantityCheck,
}

/// Starter product detected on the estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarterType {
    Universal,
    CutFromWaste,
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarterStripAnalysis {
    #[serde(flatten)]
    pub result: ComplianceResult,
    pub analysis_path: StarterStripPath,
    pub roof_type: RoofType,
    pub starter_type: Option<StarterType>,
    pub line_items_found: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DripEdgePath {
    NoEdgeMeasurements,
    BothEdgesAdequate,
    OneEdgeDeficient,
    BothEdgesDeficient,
}

/// State of one protected edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Adequate,
    Short,
    Missing,
    NotMeasured,
}

/// Finding for one edge (rakes for drip edge, eaves for gutter apron)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFinding {
    pub status: EdgeStatus,
    pub required_length: Option<f64>,
    pub estimate_length: f64,
    pub shortfall: f64,
    pub unit_price: f64,
    pub cost_impact: f64,
    pub material_status: MaterialStatus,
}

impl EdgeFinding {
    pub fn is_deficient(&self) -> bool {
        matches!(self.status, EdgeStatus::Short | EdgeStatus::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DripEdgeAnalysis {
    #[serde(flatten)]
    pub result: ComplianceResult,
    pub analysis_path: DripEdgePath,
    pub drip_edge: EdgeFinding,
    pub gutter_apron: EdgeFinding,
    pub rake_shortfall: f64,
    pub eave_shortfall: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceWaterPath {
    EavesNotMeasured,
    MissingMaterial,
    CoverageCheck,
}

/// Inputs and intermediate values of the eave-protection calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceWaterCalculation {
    pub soffit_depth_in: f64,
    pub wall_thickness_in: f64,
    pub code_minimum_in: f64,
    pub pitch: Option<String>,
    pub pitch_multiplier: f64,
    pub safety_margin: f64,
    pub required_width_in: f64,
    pub eave_length_ft: f64,
    pub required_sf: f64,
    /// Soffit depth and wall thickness were not measured and used defaults
    pub default_geometry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceWaterAnalysis {
    #[serde(flatten)]
    pub result: ComplianceResult,
    pub analysis_path: IceWaterPath,
    pub calculation: Option<IceWaterCalculation>,
    pub line_items_found: usize,
}

// ============================================================================
// Tagged union
// ============================================================================

/// Result of one rule, tagged by rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum RuleAnalysis {
    RidgeCap(RidgeCapAnalysis),
    StarterStrip(StarterStripAnalysis),
    DripEdge(DripEdgeAnalysis),
    #[serde(rename = "ice_water")]
    IceAndWater(IceWaterAnalysis),
}

impl RuleAnalysis {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleAnalysis::RidgeCap(_) => RuleType::RidgeCap,
            RuleAnalysis::StarterStrip(_) => RuleType::StarterStrip,
            RuleAnalysis::DripEdge(_) => RuleType::DripEdge,
            RuleAnalysis::IceAndWater(_) => RuleType::IceAndWater,
        }
    }

    pub fn result(&self) -> &ComplianceResult {
        match self {
            RuleAnalysis::RidgeCap(a) => &a.result,
            RuleAnalysis::StarterStrip(a) => &a.result,
            RuleAnalysis::DripEdge(a) => &a.result,
            RuleAnalysis::IceAndWater(a) => &a.result,
        }
    }

    pub fn status(&self) -> ComplianceStatus {
        self.result().status
    }

    pub fn cost_impact(&self) -> f64 {
        self.result().cost_impact
    }

    /// Every number the result carries, paired with its name
    pub fn numeric_fields(&self) -> Vec<(&'static str, f64)> {
        let base = self.result();
        let mut fields = vec![
            ("confidence", Some(base.confidence)),
            ("estimate_quantity", Some(base.estimate_quantity)),
            ("required_quantity", base.required_quantity),
            ("variance_amount", base.variance_amount),
            ("cost_impact", Some(base.cost_impact)),
        ];
        match self {
            RuleAnalysis::RidgeCap(a) => fields.push(("unit_price", Some(a.unit_price))),
            RuleAnalysis::StarterStrip(_) => {}
            RuleAnalysis::DripEdge(a) => {
                fields.push(("rake_shortfall", Some(a.rake_shortfall)));
                fields.push(("eave_shortfall", Some(a.eave_shortfall)));
                for edge in [&a.drip_edge, &a.gutter_apron] {
                    fields.push(("edge.required_length", edge.required_length));
                    fields.push(("edge.estimate_length", Some(edge.estimate_length)));
                    fields.push(("edge.shortfall", Some(edge.shortfall)));
                    fields.push(("edge.cost_impact", Some(edge.cost_impact)));
                }
            }
            RuleAnalysis::IceAndWater(a) => {
                if let Some(calc) = &a.calculation {
                    fields.push(("pitch_multiplier", Some(calc.pitch_multiplier)));
                    fields.push(("required_width_in", Some(calc.required_width_in)));
                    fields.push(("eave_length_ft", Some(calc.eave_length_ft)));
                    fields.push(("required_sf", Some(calc.required_sf)));
                }
            }
        }
        fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }

    /// Name of the decision-tree branch that produced this result
    pub fn analysis_path(&self) -> String {
        let value = match self {
            RuleAnalysis::RidgeCap(a) => serde_json::to_value(a.analysis_path),
            RuleAnalysis::StarterStrip(a) => serde_json::to_value(a.analysis_path),
            RuleAnalysis::DripEdge(a) => serde_json::to_value(a.analysis_path),
            RuleAnalysis::IceAndWater(a) => serde_json::to_value(a.analysis_path),
        };
        value
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

// ============================================================================
// Run results
// ============================================================================

/// Results of one orchestration run; a slot is None when its rule failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessRuleResults {
    pub ridge_cap: Option<RidgeCapAnalysis>,
    pub starter_strip: Option<StarterStripAnalysis>,
    pub drip_edge: Option<DripEdgeAnalysis>,
    pub ice_and_water: Option<IceWaterAnalysis>,
}

impl BusinessRuleResults {
    pub fn insert(&mut self, analysis: RuleAnalysis) {
        match analysis {
            RuleAnalysis::RidgeCap(a) => self.ridge_cap = Some(a),
            RuleAnalysis::StarterStrip(a) => self.starter_strip = Some(a),
            RuleAnalysis::DripEdge(a) => self.drip_edge = Some(a),
            RuleAnalysis::IceAndWater(a) => self.ice_and_water = Some(a),
        }
    }

    pub fn get(&self, rule: RuleType) -> Option<&ComplianceResult> {
        match rule {
            RuleType::RidgeCap => self.ridge_cap.as_ref().map(|a| &a.result),
            RuleType::StarterStrip => self.starter_strip.as_ref().map(|a| &a.result),
            RuleType::DripEdge => self.drip_edge.as_ref().map(|a| &a.result),
            RuleType::IceAndWater => self.ice_and_water.as_ref().map(|a| &a.result),
        }
    }

    /// Results present in this run, in execution order
    pub fn iter(&self) -> impl Iterator<Item = (RuleType, &ComplianceResult)> + '_ {
        RuleType::ALL
            .into_iter()
            .filter_map(move |rule| self.get(rule).map(|result| (rule, result)))
    }
}

/// Aggregate over one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub job_id: Uuid,
    pub run_id: Uuid,
    pub rules_evaluated: usize,
    pub failed_rules: Vec<RuleType>,
    pub compliant: usize,
    pub supplements_needed: usize,
    pub partial: usize,
    pub insufficient_data: usize,
    pub total_cost_impact: f64,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisSummary {
    pub fn from_results(job_id: Uuid, run_id: Uuid, results: &BusinessRuleResults) -> Self {
        let mut summary = Self {
            job_id,
            run_id,
            rules_evaluated: 0,
            failed_rules: RuleType::ALL
                .into_iter()
                .filter(|rule| results.get(*rule).is_none())
                .collect(),
            compliant: 0,
            supplements_needed: 0,
            partial: 0,
            insufficient_data: 0,
            total_cost_impact: 0.0,
            completed_at: Utc::now(),
        };

        for (_, result) in results.iter() {
            summary.rules_evaluated += 1;
            match result.status {
                ComplianceStatus::Compliant => summary.compliant += 1,
                ComplianceStatus::SupplementNeeded => summary.supplements_needed += 1,
                ComplianceStatus::Partial => summary.partial += 1,
                ComplianceStatus::InsufficientData => summary.insufficient_data += 1,
            }
            summary.total_cost_impact = safe_add(summary.total_cost_impact, result.cost_impact, 2);
        }

        summary
    }

    pub fn is_complete(&self) -> bool {
        self.failed_rules.is_empty()
    }
}

/// Returned by a run: identifiers, per-rule results and the aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub results: BusinessRuleResults,
    pub summary: AnalysisSummary,
}

/// Persisted, immutable analysis record keyed by (job_id, rule_type, run_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRuleAnalysis {
    pub id: Uuid,
    pub job_id: Uuid,
    pub rule_type: RuleType,
    pub run_id: Uuid,
    pub status: ComplianceStatus,
    pub confidence: f64,
    pub cost_impact: f64,
    pub analysis: RuleAnalysis,
    pub analyzed_at: DateTime<Utc>,
}

impl StoredRuleAnalysis {
    pub fn new(job_id: Uuid, run_id: Uuid, analysis: RuleAnalysis) -> Self {
        let result = analysis.result();
        Self {
            id: Uuid::new_v4(),
            job_id,
            rule_type: analysis.rule_type(),
            run_id,
            status: result.status,
            confidence: result.confidence,
            cost_impact: result.cost_impact,
            analyzed_at: result.analyzed_at,
            analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base(status: ComplianceStatus, cost: f64) -> ComplianceResult {
        ComplianceResult {
            status,
            confidence: 0.8,
            reasoning: String::new(),
            unit: "LF".to_string(),
            estimate_quantity: 0.0,
            required_quantity: Some(10.0),
            variance: None,
            variance_amount: None,
            variance_type: None,
            material_status: MaterialStatus::Compliant,
            cost_impact: cost,
            current_specification: None,
            documentation_note: String::new(),
            evidence_references: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }

    fn ridge(status: ComplianceStatus, cost: f64) -> RidgeCapAnalysis {
        RidgeCapAnalysis {
            result: base(status, cost),
            analysis_path: RidgeCapPath::QuantityCheck,
            roof_type: RoofType::Laminated,
            ridge_cap_quality: None,
            line_items_found: 1,
            required_source: RequiredLengthSource::RidgePlusHip,
            unit_price: 42.9,
        }
    }

    #[test]
    fn summary_counts_statuses_and_failed_slots() {
        let mut results = BusinessRuleResults::default();
        results.insert(RuleAnalysis::RidgeCap(ridge(
            ComplianceStatus::SupplementNeeded,
            4847.7,
        )));
        results.insert(RuleAnalysis::StarterStrip(StarterStripAnalysis {
            result: base(ComplianceStatus::SupplementNeeded, 342.0),
            analysis_path: StarterStripPath::MissingMaterial,
            roof_type: RoofType::Laminated,
            starter_type: None,
            line_items_found: 0,
        }));

        let summary = AnalysisSummary::from_results(Uuid::new_v4(), Uuid::new_v4(), &results);
        assert_eq!(summary.rules_evaluated, 2);
        assert_eq!(
            summary.failed_rules,
            vec![RuleType::DripEdge, RuleType::IceAndWater]
        );
        assert_eq!(summary.supplements_needed, 2);
        assert_eq!(summary.total_cost_impact, 5189.7);
        assert!(!summary.is_complete());
    }

    #[test]
    fn rule_analysis_serializes_with_rule_tag_and_flat_base() {
        let analysis = RuleAnalysis::RidgeCap(ridge(ComplianceStatus::Compliant, 0.0));
        let value = serde_json::to_value(&analysis).unwrap();

        assert_eq!(value["rule_type"], "ridge_cap");
        assert_eq!(value["status"], "COMPLIANT");
        assert_eq!(value["analysis_path"], "quantity_check");

        let back: RuleAnalysis = serde_json::from_value(value).unwrap();
        assert_eq!(back.rule_type(), RuleType::RidgeCap);
        assert_eq!(analysis.analysis_path(), "quantity_check");
    }

    #[test]
    fn edges_specification_keeps_both_sides() {
        let spec = CurrentSpecification::Edges {
            drip_edge: None,
            gutter_apron: Some(LineItemSnapshot {
                code: Some("RFG GUTA".to_string()),
                description: "Gutter apron".to_string(),
                quantity: 80.0,
                unit: "LF".to_string(),
                rate: Some(3.15),
                total: Some(252.0),
            }),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["kind"], "edges");
        assert!(value["drip_edge"].is_null());
        assert_eq!(value["gutter_apron"]["quantity"], 80.0);
    }
}
