use std::sync::Arc;

use crate::config::Config;
use crate::history::HistoryStore;
use crate::screening::orchestrator::ScreeningOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<ScreeningOrchestrator>,
    /// Postgres in production, in-memory in tests.
    pub history: Arc<dyn HistoryStore>,
}
