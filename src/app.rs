use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Settings;
use crate::middleware::{request_id_layer, RequestIdSpan};
use crate::routes;
use crate::rules::RuleSet;
use crate::services::{AnalysisStore, AnalysisWorker, PgAnalysisStore, ProgressHub, RedisCache, TracingObserver};

/// Shared application state
pub struct AppState<S = PgAnalysisStore> {
    pub settings: Settings,
    pub worker: Arc<AnalysisWorker<S>>,
    /// None when Redis was unreachable at startup; reads go straight to the store
    pub cache: Option<RedisCache>,
    pub progress: ProgressHub,
}

impl<S: AnalysisStore> AppState<S> {
    pub fn new(store: S, settings: Settings, cache: Option<RedisCache>) -> Arc<Self> {
        let progress = ProgressHub::new(settings.progress_channel_capacity);
        let worker = AnalysisWorker::new(store, RuleSet::standard(&settings.rules))
            .with_observer(Arc::new(TracingObserver))
            .with_observer(Arc::new(progress.clone()));

        Arc::new(Self {
            settings,
            worker: Arc::new(worker),
            cache,
            progress,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app<S: AnalysisStore>(state: Arc<AppState<S>>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep per-request overhead low at INFO
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(RequestIdSpan)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderName::from_static("x-request-id"),
        ]))
        .max_age(max_age)
}
