//! Shared application state injected into every route handler.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::llm::LlmClient;
use crate::orchestrator::AnalysisOrchestrator;
use crate::storage::Storage;

/// Handles to the LLM client, database, and analysis pipeline, cloned
/// cheaply (all fields are `Arc`) into each request.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    /// Single-connection storage behind an async mutex — requests serialize
    /// on it, which is adequate for a single-instance deployment. Shared
    /// with the orchestrator so background indexing writes through the
    /// same handle.
    pub storage: Arc<Mutex<dyn Storage>>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
}
