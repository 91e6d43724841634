//! Business rule analysis routes
//!
//! Trigger a run, read persisted results and follow live progress over SSE.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::analysis::{AnalysisRun, StoredRuleAnalysis};
use crate::domain::progress::ProgressEvent;
use crate::error::{ApiError, ApiResult};
use crate::services::cache::keys;
use crate::services::AnalysisStore;

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub job_id: Uuid,
    pub complete: bool,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /jobs/:job_id/analysis
///
/// Run every business rule for the job. The run and the cache invalidation
/// execute on their own task, so a client disconnect does not abort either.
pub async fn run_analysis<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<AnalysisRun>>> {
    let worker = state.worker.clone();
    let cache = state.cache.clone();
    let run = tokio::spawn(async move {
        let run = worker.run_all_business_rules(job_id).await?;
        if let Some(cache) = cache {
            if let Err(e) = cache.delete(&keys::analysis_latest(job_id)).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to invalidate cached analysis");
            }
        }
        Ok::<_, ApiError>(run)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("analysis task failed: {}", e)))??;

    Ok(Json(DataResponse::new(run)))
}

/// GET /jobs/:job_id/analysis
///
/// Latest persisted result per rule.
pub async fn latest_analysis<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<Vec<StoredRuleAnalysis>>>> {
    let key = keys::analysis_latest(job_id);

    if let Some(cache) = &state.cache {
        if let Some(records) = cache.get::<Vec<StoredRuleAnalysis>>(&key).await {
            return Ok(Json(DataResponse::new(records)));
        }
    }

    let records = state.worker.latest_results(job_id).await?;

    if let Some(cache) = &state.cache {
        if !records.is_empty() {
            if let Err(e) = cache.set(&key, &records).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to cache analysis");
            }
        }
    }

    Ok(Json(DataResponse::new(records)))
}

/// GET /jobs/:job_id/analysis/progress
pub async fn analysis_progress<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<Vec<ProgressEvent>>>> {
    let progress = state.worker.get_analysis_progress(job_id).await?;
    Ok(Json(DataResponse::new(progress)))
}

/// GET /jobs/:job_id/analysis/complete
pub async fn analysis_complete<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<CompletionResponse>>> {
    let complete = state.worker.is_analysis_complete(job_id).await?;
    Ok(Json(DataResponse::new(CompletionResponse { job_id, complete })))
}

/// GET /jobs/:job_id/analysis/history
///
/// Every persisted record for the job, newest first.
pub async fn analysis_history<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Paginated<StoredRuleAnalysis>> {
    let page = state
        .worker
        .history(job_id, params.limit(), params.offset())
        .await?;
    Ok(Paginated::new(page.records, &params, page.total))
}

/// GET /jobs/:job_id/analysis/stream
///
/// Server-sent `progress` events for runs of this job.
pub async fn stream_progress<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    state.worker.ensure_job(job_id).await?;

    let stream = state
        .progress
        .job_stream(job_id)
        .map(|event| Event::default().event("progress").json_data(&event));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
