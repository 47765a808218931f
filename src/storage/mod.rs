//! Storage layer (C5 persistence).
//!
//! Provides persistent storage for documents, structural chunks, chunk
//! embeddings, and completed analysis reports using `SQLite`.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::SqliteStorage;
pub use traits::{DocumentRecord, IndexStats, Storage, StorageStats, StoredChunk};

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "./data/contracts.db";
