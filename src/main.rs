mod api;
mod app;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod rules;
mod services;

use anyhow::Result;

use services::{PgAnalysisStore, RedisCache};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting roof audit backend"
    );

    // Create database pool and bring the schema up to date
    let pool = db::create_pool(&settings).await?;
    db::run_migrations(&pool).await?;

    // Redis only fronts reads, so start without it rather than fail
    let cache = match RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await {
        Ok(cache) => {
            tracing::info!("Redis cache initialized");
            Some(cache)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable - serving analysis reads from Postgres");
            None
        }
    };

    // Create application state
    let state = app::AppState::new(PgAnalysisStore::new(pool), settings.clone(), cache);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
