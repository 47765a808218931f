//! Environment-driven configuration.
//!
//! Every setting can be supplied as a CLI flag or, more commonly in a
//! service deployment, its matching environment variable.

use clap::Parser;

use crate::error::{ConfigError, Result};

/// Service configuration, loaded once at startup.
#[derive(Debug, Clone, Parser)]
#[command(name = "contract-review-engine", about = "Legal contract risk review service")]
pub struct AppConfig {
    /// Bearer token for the chat/embedding endpoints.
    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: String,

    /// Chat completion endpoint URL.
    #[arg(long, env = "LLM_CHAT_ENDPOINT")]
    pub llm_chat_endpoint: String,

    /// Embedding endpoint URL.
    #[arg(long, env = "LLM_EMBEDDING_ENDPOINT")]
    pub llm_embedding_endpoint: String,

    /// Default chat model identifier.
    #[arg(long, env = "LLM_CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub llm_chat_model: String,

    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Deployment environment name, used to gate verbose logging.
    #[arg(long, env = "NODE_ENV", default_value = "development")]
    pub node_env: String,

    /// Path to the `SQLite` database file.
    #[arg(long, env = "DATABASE_PATH", default_value = crate::storage::DEFAULT_DB_PATH)]
    pub database_path: String,

    /// Number of chunks analyzed concurrently during the map phase.
    #[arg(long, env = "MAP_CONCURRENCY", default_value_t = 4)]
    pub map_concurrency: usize,
}

impl AppConfig {
    /// Parses configuration from CLI arguments and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a required setting is
    /// missing or malformed.
    pub fn load() -> Result<Self> {
        Self::try_parse()
            .map_err(|e| ConfigError::InvalidValue {
                name: "configuration".to_string(),
                reason: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// `true` when running in production, which disables pretty-printed
    /// logging in favor of structured JSON.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }
}
