//! Analysis progress domain types
//!
//! Rule identifiers, worker stages and the progress events forwarded to
//! observers while a run is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Business rules evaluated for every job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    RidgeCap,
    StarterStrip,
    DripEdge,
    #[serde(rename = "ice_water")]
    IceAndWater,
}

impl RuleType {
    /// Execution order used by the worker
    pub const ALL: [RuleType; 4] = [
        RuleType::RidgeCap,
        RuleType::StarterStrip,
        RuleType::DripEdge,
        RuleType::IceAndWater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::RidgeCap => "ridge_cap",
            RuleType::StarterStrip => "starter_strip",
            RuleType::DripEdge => "drip_edge",
            RuleType::IceAndWater => "ice_water",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RuleType::RidgeCap => "Ridge Cap",
            RuleType::StarterStrip => "Starter Strip",
            RuleType::DripEdge => "Drip Edge & Gutter Apron",
            RuleType::IceAndWater => "Ice & Water Barrier",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ridge_cap" => Some(RuleType::RidgeCap),
            "starter_strip" => Some(RuleType::StarterStrip),
            "drip_edge" => Some(RuleType::DripEdge),
            "ice_water" => Some(RuleType::IceAndWater),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worker stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    DataLoading,
    Rule(RuleType),
    Done,
}

impl AnalysisStage {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisStage::DataLoading => "data_loading",
            AnalysisStage::Rule(rule) => rule.as_str(),
            AnalysisStage::Done => "done",
        }
    }

    /// Progress percentage reported when the stage starts
    pub fn start_percent(&self) -> u8 {
        match self {
            AnalysisStage::DataLoading => 5,
            AnalysisStage::Rule(RuleType::RidgeCap) => 10,
            AnalysisStage::Rule(RuleType::StarterStrip) => 30,
            AnalysisStage::Rule(RuleType::DripEdge) => 50,
            AnalysisStage::Rule(RuleType::IceAndWater) => 70,
            AnalysisStage::Done => 100,
        }
    }

    /// Progress percentage reported when the stage finishes (either way)
    pub fn end_percent(&self) -> u8 {
        match self {
            AnalysisStage::DataLoading => 10,
            AnalysisStage::Rule(RuleType::RidgeCap) => 30,
            AnalysisStage::Rule(RuleType::StarterStrip) => 50,
            AnalysisStage::Rule(RuleType::DripEdge) => 70,
            AnalysisStage::Rule(RuleType::IceAndWater) => 90,
            AnalysisStage::Done => 100,
        }
    }
}

/// Progress status of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressStatus::Pending => write!(f, "pending"),
            ProgressStatus::Running => write!(f, "running"),
            ProgressStatus::Completed => write!(f, "completed"),
            ProgressStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Progress notification; ephemeral, only forwarded to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub rule_name: String,
    pub status: ProgressStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        job_id: Uuid,
        stage: AnalysisStage,
        status: ProgressStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            rule_name: stage.name().to_string(),
            status,
            progress: progress.min(100),
            message: message.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
