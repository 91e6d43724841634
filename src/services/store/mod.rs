//! Persistence boundary for jobs, extraction input and analysis records
//!
//! Analysis records are append-only and keyed by `(job_id, rule_type,
//! run_id)`. Saving the same key twice is a no-op, so a retried write can
//! never duplicate a result.

use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::analysis::StoredRuleAnalysis;
use crate::domain::progress::RuleType;
use crate::rules::AnalysisInput;

#[cfg(test)]
mod memory;
mod postgres;

#[cfg(test)]
pub use memory::MemoryAnalysisStore;
pub use postgres::PgAnalysisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// One page of analysis history plus the total record count
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub records: Vec<StoredRuleAnalysis>,
    pub total: u64,
}

pub trait AnalysisStore: Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn job_exists(&self, job_id: Uuid) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Most recent extraction bundle for the job, if any
    fn latest_extraction(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<AnalysisInput>, StoreError>> + Send;

    /// Insert a record; returns false when the key already existed
    fn save_rule_analysis(
        &self,
        record: &StoredRuleAnalysis,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Latest record per rule, in run order; rules never analyzed are absent
    fn latest_results(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Vec<StoredRuleAnalysis>, StoreError>> + Send;

    fn has_result(
        &self,
        job_id: Uuid,
        rule_type: RuleType,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// All records for the job, newest first
    fn history(
        &self,
        job_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<HistoryPage, StoreError>> + Send;
}

/// [`RuleType`] orders by run order
pub(crate) fn sort_by_run_order(records: &mut [StoredRuleAnalysis]) {
    records.sort_by_key(|r| r.rule_type);
}
