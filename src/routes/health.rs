use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::services::AnalysisStore;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub redis: String,
}

/// Health check endpoint - public
pub async fn health_check<S: AnalysisStore>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = state.worker.store().ping().await.is_ok();
    let redis_status = match &state.cache {
        Some(cache) => {
            if cache.health_check().await.is_ok() {
                "ok"
            } else {
                "error"
            }
        }
        None => "disabled",
    };

    // Redis only degrades reads; the database is critical
    let status = match (db_ok, redis_status) {
        (false, _) => "unhealthy",
        (true, "ok") => "healthy",
        (true, _) => "degraded",
    };

    let status_code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: if db_ok { "ok" } else { "error" }.to_string(),
                redis: redis_status.to_string(),
            },
        }),
    )
}
