//! Drip edge and gutter apron rule
//!
//! Two edges are checked independently under one rule: drip edge along the
//! rakes and gutter apron along the eaves. The materials look alike but are
//! not interchangeable, so a line item only ever counts toward one side.

use chrono::Utc;

use super::precision::{
    format_currency, format_measurement, format_signed_measurement, safe_add, safe_multiply,
    safe_subtract, DEFAULT_DECIMALS,
};
use super::{
    clamp_confidence, ensure_finite, line_item_evidence, measurement_evidence, mentions_any,
    total_quantity, AnalysisInput, ComplianceRule, RuleError,
};
use crate::domain::analysis::{
    ComplianceResult, ComplianceStatus, CurrentSpecification, DripEdgeAnalysis, DripEdgePath,
    EdgeFinding, EdgeStatus, LineItemSnapshot, MaterialStatus, RuleAnalysis, VarianceType,
};
use crate::domain::estimate::LineItem;
use crate::domain::measurements::MeasurementSource;
use crate::domain::progress::RuleType;

/// A side short by at least this share of its requirement needs a full supplement
pub const SEVERE_SHORTFALL_RATIO: f64 = 0.5;
pub const EXCESS_THRESHOLD_LF: f64 = 20.0;

const DRIP_EDGE_KEYWORDS: &[&str] = &["drip edge", "drip-edge", "dripedge", "rfg drip"];
const GUTTER_APRON_KEYWORDS: &[&str] = &["gutter apron", "gutter-apron", "eave apron", "rfg guta"];

pub struct DripEdgeRule {
    drip_edge_per_lf: f64,
    gutter_apron_per_lf: f64,
}

impl DripEdgeRule {
    pub fn new(drip_edge_per_lf: f64, gutter_apron_per_lf: f64) -> Self {
        Self {
            drip_edge_per_lf,
            gutter_apron_per_lf,
        }
    }
}

impl Default for DripEdgeRule {
    fn default() -> Self {
        let pricing = super::RulePricing::default();
        Self::new(pricing.drip_edge_per_lf, pricing.gutter_apron_per_lf)
    }
}

impl ComplianceRule for DripEdgeRule {
    fn rule_type(&self) -> RuleType {
        RuleType::DripEdge
    }

    fn evaluate(&self, input: &AnalysisInput) -> Result<RuleAnalysis, RuleError> {
        input.validate()?;
        self.analyze(input).map(RuleAnalysis::DripEdge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Rake,
    Eave,
}

impl Edge {
    fn label(&self) -> &'static str {
        match self {
            Edge::Rake => "Drip edge (rakes)",
            Edge::Eave => "Gutter apron (eaves)",
        }
    }

    fn material(&self) -> &'static str {
        match self {
            Edge::Rake => "drip edge",
            Edge::Eave => "gutter apron",
        }
    }
}

/// Which edge an item belongs to; gutter apron wording wins on combined lines
fn classify(item: &LineItem) -> Option<Edge> {
    if mentions_any(item, GUTTER_APRON_KEYWORDS) {
        Some(Edge::Eave)
    } else if mentions_any(item, DRIP_EDGE_KEYWORDS) {
        Some(Edge::Rake)
    } else {
        None
    }
}

fn evaluate_edge(required: Option<f64>, items: &[&LineItem], rate: f64) -> Result<EdgeFinding, RuleError> {
    let estimate = total_quantity(items.iter().copied());

    let Some(required) = required else {
        return Ok(EdgeFinding {
            status: EdgeStatus::NotMeasured,
            required_length: None,
            estimate_length: estimate,
            shortfall: 0.0,
            unit_price: rate,
            cost_impact: 0.0,
            material_status: if items.is_empty() {
                MaterialStatus::NonCompliant
            } else {
                MaterialStatus::Compliant
            },
        });
    };

    let shortfall = safe_subtract(required, estimate, DEFAULT_DECIMALS).max(0.0);
    let status = if shortfall <= 0.0 {
        EdgeStatus::Adequate
    } else if items.is_empty() {
        EdgeStatus::Missing
    } else {
        EdgeStatus::Short
    };
    let cost_impact = ensure_finite(
        "edge cost impact",
        safe_multiply(shortfall, rate, DEFAULT_DECIMALS),
    )?;

    Ok(EdgeFinding {
        status,
        required_length: Some(required),
        estimate_length: estimate,
        shortfall,
        unit_price: rate,
        cost_impact,
        material_status: if status == EdgeStatus::Adequate {
            MaterialStatus::Compliant
        } else {
            MaterialStatus::NonCompliant
        },
    })
}

fn is_severe(finding: &EdgeFinding) -> bool {
    match (finding.status, finding.required_length) {
        (EdgeStatus::Missing, _) => true,
        (EdgeStatus::Short, Some(required)) if required > 0.0 => {
            finding.shortfall / required >= SEVERE_SHORTFALL_RATIO
        }
        _ => false,
    }
}

fn describe_edge(edge: Edge, finding: &EdgeFinding) -> String {
    match finding.status {
        EdgeStatus::NotMeasured => format!(
            "{}: not evaluated; the measurement report gives no {} length (estimate carries {}).",
            edge.label(),
            match edge {
                Edge::Rake => "rake",
                Edge::Eave => "eave",
            },
            format_measurement(finding.estimate_length, "LF"),
        ),
        EdgeStatus::Missing => format!(
            "{}: no {} line item on the estimate; {} required, adding {} at {}/LF.",
            edge.label(),
            edge.material(),
            format_measurement(finding.required_length.unwrap_or_default(), "LF"),
            format_currency(finding.cost_impact),
            format_currency(finding.unit_price),
        ),
        EdgeStatus::Short => format!(
            "{}: estimate carries {} against {} required, short by {}; adding {} at {}/LF.",
            edge.label(),
            format_measurement(finding.estimate_length, "LF"),
            format_measurement(finding.required_length.unwrap_or_default(), "LF"),
            format_measurement(finding.shortfall, "LF"),
            format_currency(finding.cost_impact),
            format_currency(finding.unit_price),
        ),
        EdgeStatus::Adequate => format!(
            "{}: estimate carries {} against {} required; covered.",
            edge.label(),
            format_measurement(finding.estimate_length, "LF"),
            format_measurement(finding.required_length.unwrap_or_default(), "LF"),
        ),
    }
}

impl DripEdgeRule {
    fn analyze(&self, input: &AnalysisInput) -> Result<DripEdgeAnalysis, RuleError> {
        let measurements = input.measurements();
        let rake_items: Vec<&LineItem> = input
            .line_items
            .iter()
            .filter(|i| classify(i) == Some(Edge::Rake))
            .collect();
        let eave_items: Vec<&LineItem> = input
            .line_items
            .iter()
            .filter(|i| classify(i) == Some(Edge::Eave))
            .collect();

        let drip_edge = evaluate_edge(
            measurements.and_then(|m| m.rakes()),
            &rake_items,
            self.drip_edge_per_lf,
        )?;
        let gutter_apron = evaluate_edge(
            measurements.and_then(|m| m.eaves()),
            &eave_items,
            self.gutter_apron_per_lf,
        )?;

        let deficient: Vec<&EdgeFinding> = [&drip_edge, &gutter_apron]
            .into_iter()
            .filter(|f| f.is_deficient())
            .collect();
        let neither_measured = drip_edge.status == EdgeStatus::NotMeasured
            && gutter_apron.status == EdgeStatus::NotMeasured;

        let (path, status) = if neither_measured {
            (DripEdgePath::NoEdgeMeasurements, ComplianceStatus::InsufficientData)
        } else {
            match deficient.as_slice() {
                [] => (DripEdgePath::BothEdgesAdequate, ComplianceStatus::Compliant),
                [one] if is_severe(one) => {
                    (DripEdgePath::OneEdgeDeficient, ComplianceStatus::SupplementNeeded)
                }
                [_] => (DripEdgePath::OneEdgeDeficient, ComplianceStatus::Partial),
                _ => (DripEdgePath::BothEdgesDeficient, ComplianceStatus::SupplementNeeded),
            }
        };

        tracing::debug!(
            job_id = %input.job_id,
            rake_status = ?drip_edge.status,
            eave_status = ?gutter_apron.status,
            status = %status,
            "Evaluated drip edge and gutter apron"
        );

        let measured: Vec<&EdgeFinding> = [&drip_edge, &gutter_apron]
            .into_iter()
            .filter(|f| f.status != EdgeStatus::NotMeasured)
            .collect();
        let estimate = safe_add(drip_edge.estimate_length, gutter_apron.estimate_length, DEFAULT_DECIMALS);
        let required = measured.iter().fold(None, |acc: Option<f64>, f| {
            Some(safe_add(acc.unwrap_or(0.0), f.required_length.unwrap_or(0.0), DEFAULT_DECIMALS))
        });
        let total_shortfall = safe_add(drip_edge.shortfall, gutter_apron.shortfall, DEFAULT_DECIMALS);
        let cost_impact = safe_add(drip_edge.cost_impact, gutter_apron.cost_impact, DEFAULT_DECIMALS);

        let (variance_amount, variance_type) = match required {
            None => (None, None),
            Some(_) if total_shortfall > 0.0 => (Some(-total_shortfall), Some(VarianceType::Shortage)),
            Some(required) => {
                let measured_estimate = measured
                    .iter()
                    .fold(0.0, |acc, f| safe_add(acc, f.estimate_length, DEFAULT_DECIMALS));
                let amount = safe_subtract(measured_estimate, required, DEFAULT_DECIMALS);
                let kind = if amount > EXCESS_THRESHOLD_LF {
                    VarianceType::Excess
                } else {
                    VarianceType::Adequate
                };
                (Some(amount), Some(kind))
            }
        };

        let mut reasoning = vec![
            describe_edge(Edge::Rake, &drip_edge),
            describe_edge(Edge::Eave, &gutter_apron),
        ];
        reasoning.push(match status {
            ComplianceStatus::Compliant => {
                "Both edges are protected; drip edge and gutter apron quantities meet the measured lengths.".to_string()
            }
            ComplianceStatus::Partial => format!(
                "One edge is protected and the other is partially short; combined supplement {}.",
                format_currency(cost_impact)
            ),
            ComplianceStatus::SupplementNeeded => format!(
                "Edge protection is deficient; combined supplement {}.",
                format_currency(cost_impact)
            ),
            ComplianceStatus::InsufficientData => {
                "Neither rake nor eave length is available, so edge coverage cannot be verified.".to_string()
            }
        });

        let documentation_note = match status {
            ComplianceStatus::InsufficientData => "Rake and eave lengths are required to verify drip edge and gutter apron coverage. \
                 Please provide a roof measurement report so edge metal can be confirmed."
                .to_string(),
            ComplianceStatus::Compliant => "Drip edge along the rakes and gutter apron along the eaves are included at the measured \
                 lengths. No supplement is required."
                .to_string(),
            _ => {
                let mut lines = vec![
                    "Building code (IRC R905.2.8.5) requires drip edge at eaves and rake edges of shingle roofs. Drip edge at the rakes \
                     and gutter apron at the eaves are distinct components and must each be carried for its full edge length."
                        .to_string(),
                ];
                for (edge, finding) in [(Edge::Rake, &drip_edge), (Edge::Eave, &gutter_apron)] {
                    if finding.is_deficient() {
                        lines.push(format!(
                            "We request {} of {} at {}/LF ({}).",
                            format_measurement(finding.shortfall, "LF"),
                            edge.material(),
                            format_currency(finding.unit_price),
                            format_currency(finding.cost_impact),
                        ));
                    }
                }
                lines.join(" ")
            }
        };

        let mut evidence: Vec<String> = rake_items
            .iter()
            .chain(eave_items.iter())
            .map(|i| line_item_evidence(i))
            .collect();
        evidence.push(measurement_evidence(
            measurements,
            &format!(
                "rakes {}, eaves {}",
                drip_edge
                    .required_length
                    .map(|l| format_measurement(l, "LF"))
                    .unwrap_or_else(|| "not reported".to_string()),
                gutter_apron
                    .required_length
                    .map(|l| format_measurement(l, "LF"))
                    .unwrap_or_else(|| "not reported".to_string()),
            ),
        ));

        let current_specification = if rake_items.is_empty() && eave_items.is_empty() {
            None
        } else {
            Some(CurrentSpecification::Edges {
                drip_edge: rake_items.first().map(|i| LineItemSnapshot::from(*i)),
                gutter_apron: eave_items.first().map(|i| LineItemSnapshot::from(*i)),
            })
        };

        // Unmeasured edges only count when neither edge could be measured
        let material_status = if [&drip_edge, &gutter_apron]
            .into_iter()
            .filter(|f| measured.is_empty() || f.status != EdgeStatus::NotMeasured)
            .all(|f| f.material_status == MaterialStatus::Compliant)
        {
            MaterialStatus::Compliant
        } else {
            MaterialStatus::NonCompliant
        };

        Ok(DripEdgeAnalysis {
            result: ComplianceResult {
                status,
                confidence: confidence(input, &drip_edge, &gutter_apron, status),
                reasoning: reasoning.join(" "),
                unit: "LF".to_string(),
                estimate_quantity: estimate,
                required_quantity: required,
                variance: variance_amount.map(|v| format_signed_measurement(v, "LF")),
                variance_amount,
                variance_type,
                material_status,
                cost_impact,
                current_specification,
                documentation_note,
                evidence_references: evidence,
                analyzed_at: Utc::now(),
            },
            analysis_path: path,
            rake_shortfall: drip_edge.shortfall,
            eave_shortfall: gutter_apron.shortfall,
            drip_edge,
            gutter_apron,
        })
    }
}

fn confidence(
    input: &AnalysisInput,
    drip_edge: &EdgeFinding,
    gutter_apron: &EdgeFinding,
    status: ComplianceStatus,
) -> f64 {
    if status == ComplianceStatus::InsufficientData {
        return 0.2;
    }

    let mut confidence: f64 = 0.85;
    if drip_edge.status == EdgeStatus::NotMeasured || gutter_apron.status == EdgeStatus::NotMeasured {
        confidence -= 0.15;
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
