//! Analysis orchestration worker
//!
//! Runs the four business rules for one job in a fixed order:
//! `data_loading -> ridge_cap -> starter_strip -> drip_edge -> ice_water -> done`.
//!
//! A rule that fails (analyzer error or a failed write) is reported as
//! `failed`, leaves its slot empty and the run moves on. Only a failure to
//! load the job's input aborts the whole run. Each result is persisted
//! before its `completed` event goes out.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::analysis::{
    AnalysisRun, AnalysisSummary, BusinessRuleResults, RuleAnalysis, StoredRuleAnalysis,
};
use crate::domain::progress::{AnalysisStage, ProgressEvent, ProgressStatus, RuleType};
use crate::rules::precision::format_currency;
use crate::rules::{AnalysisInput, RuleSet};
use crate::services::progress::ProgressObserver;
use crate::services::store::{AnalysisStore, HistoryPage, StoreError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("No extraction data for job {0}")]
    ExtractionMissing(Uuid),

    #[error("Analysis already running for job {0}")]
    AlreadyRunning(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AnalysisWorker<S> {
    store: S,
    rules: RuleSet,
    observers: Vec<Arc<dyn ProgressObserver>>,
    in_flight: Mutex<HashSet<Uuid>>,
}

/// Removes the job from the in-flight set when the run ends, however it ends
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    job_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.job_id);
    }
}

impl<S: AnalysisStore> AnalysisWorker<S> {
    pub fn new(store: S, rules: RuleSet) -> Self {
        Self {
            store,
            rules,
            observers: Vec::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Run every business rule for the job and persist each result
    #[tracing::instrument(skip(self), fields(run_id))]
    pub async fn run_all_business_rules(&self, job_id: Uuid) -> Result<AnalysisRun, WorkerError> {
        let _guard = self.claim(job_id)?;
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        tracing::info!(job_id = %job_id, run_id = %run_id, "Starting business rule analysis");

        let loading = AnalysisStage::DataLoading;
        self.emit(ProgressEvent::new(
            job_id,
            loading,
            ProgressStatus::Running,
            loading.start_percent(),
            "Loading extraction data",
        ));
        let input = match self.load_input(job_id).await {
            Ok(input) => input,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load analysis input");
                self.emit(
                    ProgressEvent::new(
                        job_id,
                        loading,
                        ProgressStatus::Failed,
                        loading.start_percent(),
                        "Failed to load extraction data",
                    )
                    .with_error(e.to_string()),
                );
                return Err(e);
            }
        };
        self.emit(ProgressEvent::new(
            job_id,
            loading,
            ProgressStatus::Completed,
            loading.end_percent(),
            format!(
                "Loaded {} line items{}",
                input.line_items.len(),
                if input.roof_measurements.is_some() {
                    " and roof measurements"
                } else {
                    ""
                }
            ),
        ));

        let mut results = BusinessRuleResults::default();
        for rule_type in RuleType::ALL {
            let stage = AnalysisStage::Rule(rule_type);
            self.emit(ProgressEvent::new(
                job_id,
                stage,
                ProgressStatus::Running,
                stage.start_percent(),
                format!("Analyzing {}", rule_type.display_name()),
            ));

            match self.run_rule(job_id, run_id, rule_type, &input).await {
                Ok(analysis) => {
                    let result = analysis.result();
                    self.emit(ProgressEvent::new(
                        job_id,
                        stage,
                        ProgressStatus::Completed,
                        stage.end_percent(),
                        format!(
                            "{}: {} ({})",
                            rule_type.display_name(),
                            result.status,
                            format_currency(result.cost_impact)
                        ),
                    ));
                    results.insert(analysis);
                }
                Err(message) => {
                    tracing::error!(
                        job_id = %job_id,
                        run_id = %run_id,
                        rule_type = %rule_type,
                        error = %message,
                        "Business rule failed"
                    );
                    self.emit(
                        ProgressEvent::new(
                            job_id,
                            stage,
                            ProgressStatus::Failed,
                            stage.end_percent(),
                            format!("{} analysis failed", rule_type.display_name()),
                        )
                        .with_error(message),
                    );
                }
            }
        }

        let summary = AnalysisSummary::from_results(job_id, run_id, &results);
        self.emit(ProgressEvent::new(
            job_id,
            AnalysisStage::Done,
            ProgressStatus::Completed,
            AnalysisStage::Done.end_percent(),
            format!(
                "Analysis complete: {} of {} rules evaluated, {} total cost impact",
                summary.rules_evaluated,
                RuleType::ALL.len(),
                format_currency(summary.total_cost_impact)
            ),
        ));

        tracing::info!(
            job_id = %job_id,
            run_id = %run_id,
            rules_evaluated = summary.rules_evaluated,
            failed_rules = summary.failed_rules.len(),
            supplements_needed = summary.supplements_needed,
            total_cost_impact = summary.total_cost_impact,
            "Business rule analysis finished"
        );

        Ok(AnalysisRun {
            run_id,
            results,
            summary,
        })
    }

    fn claim(&self, job_id: Uuid) -> Result<InFlightGuard<'_>, WorkerError> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(job_id) {
            tracing::warn!(job_id = %job_id, "Rejected concurrent analysis run");
            return Err(WorkerError::AlreadyRunning(job_id));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            job_id,
        })
    }

    async fn load_input(&self, job_id: Uuid) -> Result<AnalysisInput, WorkerError> {
        if !self.store.job_exists(job_id).await? {
            return Err(WorkerError::JobNotFound(job_id));
        }
        self.store
            .latest_extraction(job_id)
            .await?
            .ok_or(WorkerError::ExtractionMissing(job_id))
    }

    /// Evaluate and persist one rule; any failure comes back as its message
    async fn run_rule(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        rule_type: RuleType,
        input: &AnalysisInput,
    ) -> Result<RuleAnalysis, String> {
        let analysis = self
            .rules
            .evaluate(rule_type, input)
            .map_err(|e| e.to_string())?;

        tracing::debug!(
            job_id = %job_id,
            rule_type = %rule_type,
            status = %analysis.status(),
            path = %analysis.analysis_path(),
            cost_impact = analysis.cost_impact(),
            "Rule evaluated"
        );

        let record = StoredRuleAnalysis::new(job_id, run_id, analysis.clone());
        self.store
            .save_rule_analysis(&record)
            .await
            .map_err(|e| format!("Failed to persist result: {}", e))?;

        Ok(analysis)
    }

    fn emit(&self, event: ProgressEvent) {
        for observer in &self.observers {
            if let Err(e) = observer.on_progress(&event) {
                tracing::warn!(
                    job_id = %event.job_id,
                    stage = %event.rule_name,
                    error = %e,
                    "Progress observer failed"
                );
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// True once a ridge cap result has been persisted for the job
    pub async fn is_analysis_complete(&self, job_id: Uuid) -> Result<bool, WorkerError> {
        Ok(self.store.has_result(job_id, RuleType::RidgeCap).await?)
    }

    /// One event per rule, derived from the latest persisted result
    pub async fn get_analysis_progress(&self, job_id: Uuid) -> Result<Vec<ProgressEvent>, WorkerError> {
        self.ensure_job(job_id).await?;
        let latest = self.store.latest_results(job_id).await?;

        Ok(RuleType::ALL
            .into_iter()
            .map(|rule_type| {
                let stage = AnalysisStage::Rule(rule_type);
                match latest.iter().find(|r| r.rule_type == rule_type) {
                    Some(record) => {
                        let mut event = ProgressEvent::new(
                            job_id,
                            stage,
                            ProgressStatus::Completed,
                            stage.end_percent(),
                            format!(
                                "{}: {} ({})",
                                rule_type.display_name(),
                                record.status,
                                format_currency(record.cost_impact)
                            ),
                        );
                        event.timestamp = record.analyzed_at;
                        event
                    }
                    None => ProgressEvent::new(
                        job_id,
                        stage,
                        ProgressStatus::Pending,
                        0,
                        format!("{} not analyzed yet", rule_type.display_name()),
                    ),
                }
            })
            .collect())
    }

    pub async fn latest_results(&self, job_id: Uuid) -> Result<Vec<StoredRuleAnalysis>, WorkerError> {
        self.ensure_job(job_id).await?;
        Ok(self.store.latest_results(job_id).await?)
    }

    pub async fn history(&self, job_id: Uuid, limit: u32, offset: u32) -> Result<HistoryPage, WorkerError> {
        self.ensure_job(job_id).await?;
        Ok(self.store.history(job_id, limit, offset).await?)
    }

    pub async fn ensure_job(&self, job_id: Uuid) -> Result<(), WorkerError> {
        if self.store.job_exists(job_id).await? {
            Ok(())
        } else {
            Err(WorkerError::JobNotFound(job_id))
        }
    }
}
