//! Binary entry point for the contract review service.

use std::net::SocketAddr;
use std::sync::Arc;

use contract_review_engine::web::{self, AppState};
use contract_review_engine::{AnalysisOrchestrator, AppConfig, HttpLlmClient, LlmConfig, SqliteStorage, Storage};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    let llm = Arc::new(HttpLlmClient::new(LlmConfig {
        chat_endpoint: config.llm_chat_endpoint,
        embedding_endpoint: config.llm_embedding_endpoint,
        api_key: config.llm_api_key,
        default_model: config.llm_chat_model,
    })?);

    let mut storage = SqliteStorage::open(&config.database_path)?;
    storage.init()?;
    let storage: Arc<Mutex<dyn Storage>> = Arc::new(Mutex::new(storage));

    let orchestrator =
        AnalysisOrchestrator::new(llm.clone(), storage.clone()).with_concurrency(config.map_concurrency);
    let state = AppState {
        llm,
        storage,
        orchestrator: Arc::new(orchestrator),
    };

    let app = web::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "contract review engine listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Pretty logging in development, structured JSON in production.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.is_production() {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}
