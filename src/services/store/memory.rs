//! In-memory analysis store for tests

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::{sort_by_run_order, AnalysisStore, HistoryPage, StoreError};
use crate::domain::analysis::StoredRuleAnalysis;
use crate::domain::progress::RuleType;
use crate::rules::AnalysisInput;

#[derive(Default)]
struct State {
    jobs: HashSet<Uuid>,
    extractions: HashMap<Uuid, AnalysisInput>,
    analyses: Vec<StoredRuleAnalysis>,
    failing_rules: HashSet<RuleType>,
}

/// Clones share the same state
#[derive(Clone, Default)]
pub struct MemoryAnalysisStore {
    state: Arc<RwLock<State>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job_id: Uuid) {
        self.state.write().jobs.insert(job_id);
    }

    /// Registers the job too
    pub fn insert_extraction(&self, input: AnalysisInput) {
        let mut state = self.state.write();
        state.jobs.insert(input.job_id);
        state.extractions.insert(input.job_id, input);
    }

    /// Make every save for `rule_type` fail
    pub fn fail_saves_for(&self, rule_type: RuleType) {
        self.state.write().failing_rules.insert(rule_type);
    }

    pub fn records(&self, job_id: Uuid) -> Vec<StoredRuleAnalysis> {
        self.state
            .read()
            .analyses
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect()
    }
}

impl AnalysisStore for MemoryAnalysisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn job_exists(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.read().jobs.contains(&job_id))
    }

    async fn latest_extraction(&self, job_id: Uuid) -> Result<Option<AnalysisInput>, StoreError> {
        Ok(self.state.read().extractions.get(&job_id).cloned())
    }

    async fn save_rule_analysis(&self, record: &StoredRuleAnalysis) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        if state.failing_rules.contains(&record.rule_type) {
            return Err(StoreError::InvalidData(format!(
                "write rejected for {}",
                record.rule_type
            )));
        }
        let duplicate = state.analyses.iter().any(|r| {
            r.job_id == record.job_id && r.rule_type == record.rule_type && r.run_id == record.run_id
        });
        if duplicate {
            return Ok(false);
        }
        state.analyses.push(record.clone());
        Ok(true)
    }

    async fn latest_results(&self, job_id: Uuid) -> Result<Vec<StoredRuleAnalysis>, StoreError> {
        let state = self.state.read();
        let mut latest: HashMap<RuleType, &StoredRuleAnalysis> = HashMap::new();
        for record in state.analyses.iter().filter(|r| r.job_id == job_id) {
            let newer = latest
                .get(&record.rule_type)
                .map_or(true, |current| record.analyzed_at >= current.analyzed_at);
            if newer {
                latest.insert(record.rule_type, record);
            }
        }
        let mut records: Vec<StoredRuleAnalysis> = latest.into_values().cloned().collect();
        sort_by_run_order(&mut records);
        Ok(records)
    }

    async fn has_result(&self, job_id: Uuid, rule_type: RuleType) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .analyses
            .iter()
            .any(|r| r.job_id == job_id && r.rule_type == rule_type))
    }

    async fn history(&self, job_id: Uuid, limit: u32, offset: u32) -> Result<HistoryPage, StoreError> {
        let mut records = self.records(job_id);
        records.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        let total = records.len() as u64;
        Ok(HistoryPage {
            records: records
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total,
        })
    }
}
