//! Postgres-backed analysis store

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use uuid::Uuid;

use super::{sort_by_run_order, AnalysisStore, HistoryPage, StoreError};
use crate::domain::analysis::{ComplianceStatus, RuleAnalysis, StoredRuleAnalysis};
use crate::domain::progress::RuleType;
use crate::rules::AnalysisInput;

#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ExtractionRow {
    line_items: Option<serde_json::Value>,
    roof_measurements: Option<serde_json::Value>,
    roof_type: Option<serde_json::Value>,
}

#[derive(Debug, sqlx::FromRow)]
struct RuleAnalysisRow {
    id: Uuid,
    job_id: Uuid,
    rule_type: String,
    run_id: Uuid,
    status: String,
    confidence: Decimal,
    cost_impact: Decimal,
    result: serde_json::Value,
    analyzed_at: DateTime<Utc>,
}

const ANALYSIS_COLUMNS: &str =
    "id, job_id, rule_type, run_id, status, confidence, cost_impact, result, analyzed_at";

// ============================================================================
// Conversion Functions
// ============================================================================

/// JSON null and SQL NULL both mean "not extracted"
fn decode_optional<T: DeserializeOwned>(value: Option<serde_json::Value>) -> Result<Option<T>, StoreError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

fn to_decimal(label: &str, value: f64, scale: u32) -> Result<Decimal, StoreError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(scale))
        .ok_or_else(|| StoreError::InvalidData(format!("{} {} is not representable", label, value)))
}

fn decimal_to_f64(label: &str, value: Decimal) -> Result<f64, StoreError> {
    value
        .to_f64()
        .ok_or_else(|| StoreError::InvalidData(format!("{} {} out of range", label, value)))
}

impl TryFrom<RuleAnalysisRow> for StoredRuleAnalysis {
    type Error = StoreError;

    fn try_from(row: RuleAnalysisRow) -> Result<Self, Self::Error> {
        let rule_type = RuleType::parse(&row.rule_type)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown rule type {}", row.rule_type)))?;
        let status = ComplianceStatus::parse(&row.status)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown status {}", row.status)))?;
        let analysis: RuleAnalysis = serde_json::from_value(row.result)?;
        if analysis.rule_type() != rule_type {
            return Err(StoreError::InvalidData(format!(
                "record {} is tagged {} but holds a {} result",
                row.id,
                rule_type,
                analysis.rule_type()
            )));
        }

        Ok(Self {
            id: row.id,
            job_id: row.job_id,
            rule_type,
            run_id: row.run_id,
            status,
            confidence: decimal_to_f64("confidence", row.confidence)?,
            cost_impact: decimal_to_f64("cost_impact", row.cost_impact)?,
            analysis,
            analyzed_at: row.analyzed_at,
        })
    }
}

// ============================================================================
// Store
// ============================================================================

impl AnalysisStore for PgAnalysisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn job_exists(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM roof_jobs WHERE id = $1)")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn latest_extraction(&self, job_id: Uuid) -> Result<Option<AnalysisInput>, StoreError> {
        let row: Option<ExtractionRow> = sqlx::query_as(
            r#"
            SELECT line_items, roof_measurements, roof_type
            FROM job_extractions
            WHERE job_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(AnalysisInput {
            job_id,
            line_items: decode_optional(row.line_items)?.unwrap_or_default(),
            roof_measurements: decode_optional(row.roof_measurements)?,
            roof_type: decode_optional(row.roof_type)?,
        }))
    }

    async fn save_rule_analysis(&self, record: &StoredRuleAnalysis) -> Result<bool, StoreError> {
        let result = serde_json::to_value(&record.analysis)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO rule_analyses
                (id, job_id, rule_type, run_id, status, confidence, cost_impact, result, analyzed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (job_id, rule_type, run_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.job_id)
        .bind(record.rule_type.as_str())
        .bind(record.run_id)
        .bind(record.status.as_str())
        .bind(to_decimal("confidence", record.confidence, 4)?)
        .bind(to_decimal("cost_impact", record.cost_impact, 2)?)
        .bind(&result)
        .bind(record.analyzed_at)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        tracing::debug!(
            job_id = %record.job_id,
            run_id = %record.run_id,
            rule_type = %record.rule_type,
            inserted,
            "Saved rule analysis"
        );

        Ok(inserted)
    }

    async fn latest_results(&self, job_id: Uuid) -> Result<Vec<StoredRuleAnalysis>, StoreError> {
        let rows: Vec<RuleAnalysisRow> = sqlx::query_as(&format!(
            r#"
            SELECT DISTINCT ON (rule_type) {}
            FROM rule_analyses
            WHERE job_id = $1
            ORDER BY rule_type, analyzed_at DESC
            "#,
            ANALYSIS_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = rows
            .into_iter()
            .map(StoredRuleAnalysis::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_run_order(&mut records);
        Ok(records)
    }

    async fn has_result(&self, job_id: Uuid, rule_type: RuleType) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM rule_analyses WHERE job_id = $1 AND rule_type = $2)",
        )
        .bind(job_id)
        .bind(rule_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn history(&self, job_id: Uuid, limit: u32, offset: u32) -> Result<HistoryPage, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rule_analyses WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<RuleAnalysisRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM rule_analyses
            WHERE job_id = $1
            ORDER BY analyzed_at DESC, rule_type
            LIMIT $2 OFFSET $3
            "#,
            ANALYSIS_COLUMNS
        ))
        .bind(job_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(HistoryPage {
            records: rows
                .into_iter()
                .map(StoredRuleAnalysis::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            total: total.max(0) as u64,
        })
    }
}
