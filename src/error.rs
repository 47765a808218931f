//! Error hierarchy for the contract review core.
//!
//! A `thiserror`-derived tree: one top-level [`Error`] wrapping per-concern
//! variants for storage, chunking, LLM transport, and configuration.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for contract-review operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database operations, vector store).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chunking-related errors (text processing).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// LLM client errors (chat/embedding transport).
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request validation errors (missing/malformed input).
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },
}

/// Storage-specific errors for database and vector-store operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Storage not initialized.
    #[error("storage not initialized")]
    NotInitialized,

    /// Document has no indexed chunks.
    #[error("document not indexed: {document_id}")]
    DocumentNotFound {
        /// The document id that was not found.
        document_id: String,
    },

    /// Chunk not found by ID.
    #[error("chunk not found: {id}")]
    ChunkNotFound {
        /// Chunk ID that was not found.
        id: i64,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error (metadata JSON, embeddings).
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Chunking-specific errors for text processing.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid UTF-8 encountered at specific byte offset.
    #[error("invalid UTF-8 at byte offset {offset}")]
    InvalidUtf8 {
        /// Byte offset where invalid UTF-8 was found.
        offset: usize,
    },

    /// Invalid chunk configuration.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
}

/// LLM transport errors (chat/embedding requests).
#[derive(Error, Debug)]
pub enum LlmError {
    /// Transient connection failure (reset, refused, DNS). Retried inside
    /// the client per `3·2^attempt` backoff; surfaced only after retries
    /// are exhausted.
    #[error("网络连接不稳定，请检查网络后重试")]
    Connection,

    /// Request timed out against its per-call deadline. Retried per
    /// `1·2^attempt` backoff.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Upstream 4xx response. Never retried.
    #[error("llm endpoint rejected the request: HTTP {status}")]
    UpstreamClient {
        /// HTTP status code.
        status: u16,
    },

    /// Upstream 5xx response after retry exhaustion.
    #[error("llm endpoint failed after retries: HTTP {status}")]
    UpstreamServer {
        /// HTTP status code.
        status: u16,
    },

    /// Strict and brace-balanced JSON parse both failed.
    #[error("failed to parse JSON response from llm")]
    JsonParseFailed,

    /// Retry budget exhausted without a usable response.
    #[error("llm call failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

/// I/O-specific errors.
#[derive(Error, Debug)]
pub enum IoError {
    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// Configuration loading errors (startup-time, not per-request).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Name of the variable.
        name: String,
        /// Why it could not be parsed.
        reason: String,
    },
}

// --- From impls for third-party error types --------------------------------------

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_ms: 0 }
        } else {
            Self::Connection
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidState {
            message: "test error".to_string(),
        };
        assert_eq!(err.to_string(), "invalid state: test error");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotInitialized;
        assert_eq!(err.to_string(), "storage not initialized");

        let err = StorageError::DocumentNotFound {
            document_id: "doc-1".to_string(),
        };
        assert_eq!(err.to_string(), "document not indexed: doc-1");
    }

    #[test]
    fn test_llm_error_connection_message_is_chinese_user_facing() {
        let err = LlmError::Connection;
        assert_eq!(err.to_string(), "网络连接不稳定，请检查网络后重试");
    }

    #[test]
    fn test_llm_error_upstream_not_retried_variant_distinct_from_server() {
        let client_err = LlmError::UpstreamClient { status: 401 };
        let server_err = LlmError::UpstreamServer { status: 503 };
        assert!(client_err.to_string().contains("401"));
        assert!(server_err.to_string().contains("503"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar {
            name: "LLM_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("LLM_API_KEY"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_storage() {
        let storage_err = StorageError::NotInitialized;
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_error_from_chunking() {
        let chunk_err = ChunkingError::InvalidUtf8 { offset: 0 };
        let err: Error = chunk_err.into();
        assert!(matches!(err, Error::Chunking(_)));
    }

    #[test]
    fn test_error_from_llm() {
        let llm_err = LlmError::RetriesExhausted { attempts: 3 };
        let err: Error = llm_err.into();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[test]
    fn test_from_rusqlite_error_to_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    #[allow(clippy::invalid_regex)]
    fn test_from_regex_error_to_chunking_error() {
        let regex_err = regex::Regex::new("[invalid").unwrap_err();
        let err: ChunkingError = regex_err.into();
        assert!(matches!(err, ChunkingError::Regex(_)));
    }

    #[test]
    fn test_from_serde_json_error_to_storage_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
