mod config;
mod db;
mod errors;
mod extraction;
mod history;
mod llm_client;
mod models;
mod routes;
mod screening;
mod stages;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::extraction::LocalFileExtractor;
use crate::history::PgHistoryStore;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::screening::orchestrator::ScreeningOrchestrator;
use crate::stages::invoker::StageInvoker;
use crate::stages::llm::LlmStages;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screener API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let history = Arc::new(PgHistoryStore::new(db));

    // Initialize LLM-backed stages
    let llm = LlmClient::new(config.llm.timeout)?;
    let stages = Arc::new(LlmStages::new(llm));
    info!(
        "LLM stages initialized (default provider: {}, model: {})",
        config.llm.default_provider,
        config
            .llm
            .default_model
            .as_deref()
            .unwrap_or(config.llm.default_provider.default_model())
    );

    let extractor = Arc::new(LocalFileExtractor::new(&config.uploads_dir));
    info!("Reading uploaded documents from {}", config.uploads_dir);

    let invoker = StageInvoker::new(config.screening.retry_policy(), config.llm.timeout);
    let orchestrator = Arc::new(ScreeningOrchestrator::new(
        stages,
        extractor,
        history.clone(),
        invoker,
        config.screening.concurrency,
    ));
    info!(
        "Screening orchestrator ready (concurrency: {}, attempts: {}, request timeout: {}s)",
        orchestrator.concurrency(),
        config.screening.max_attempts,
        config.screening.request_timeout.as_secs()
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        orchestrator,
        history,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
