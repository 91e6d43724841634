pub mod analysis;
pub mod health;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;
use crate::services::AnalysisStore;

/// Build the API router with all routes
pub fn api_router<S: AnalysisStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/health", get(health::health_check::<S>))
        // Business rule analysis
        .route(
            "/jobs/:job_id/analysis",
            post(analysis::run_analysis::<S>).get(analysis::latest_analysis::<S>),
        )
        .route(
            "/jobs/:job_id/analysis/progress",
            get(analysis::analysis_progress::<S>),
        )
        .route(
            "/jobs/:job_id/analysis/complete",
            get(analysis::analysis_complete::<S>),
        )
        .route(
            "/jobs/:job_id/analysis/history",
            get(analysis::analysis_history::<S>),
        )
        .route(
            "/jobs/:job_id/analysis/stream",
            get(analysis::stream_progress::<S>),
        )
}
