//! Storage trait definition (C5 persistence).
//!
//! Defines the interface for document, chunk, embedding, and report
//! persistence, enabling a pluggable backend behind the orchestrator and
//! search pipeline.

use serde::Serialize;

use crate::core::{Chunk, Report};
use crate::error::Result;

/// A persisted document record.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: Option<String>,
    pub content: String,
    pub status: String,
}

/// A persisted chunk, reconstituted with its storage-assigned ID.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: String,
    pub chunk: Chunk,
    /// Open key-value map merging any caller-supplied metadata with
    /// storage-synthesized `chunk_index` and `indexed_at` fields.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Aggregate index statistics for a single document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub has_report: bool,
}

/// Trait for persistent storage backends (C5).
///
/// Implementations handle documents, their structural chunks, chunk
/// embeddings, and completed analysis reports. All operations should be
/// atomic where appropriate.
pub trait Storage: Send + Sync {
    /// Initializes storage (creates schema, runs migrations).
    ///
    /// Idempotent — safe to call multiple times.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    fn init(&mut self) -> Result<()>;

    /// Checks if storage is initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    fn is_initialized(&self) -> Result<bool>;

    // ==================== Document Operations ====================

    /// Saves a document's raw content, creating or replacing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn save_document(
        &mut self,
        document_id: &str,
        filename: Option<&str>,
        content: &str,
    ) -> Result<()>;

    /// Retrieves a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>>;

    /// Updates a document's status field (e.g. `"analyzing"`, `"complete"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist or the write fails.
    fn set_document_status(&mut self, document_id: &str, status: &str) -> Result<()>;

    /// Deletes a document and all dependent chunks, embeddings, and reports.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_document(&mut self, document_id: &str) -> Result<()>;

    // ==================== Chunk / Embedding Operations ====================

    /// Replaces a document's chunk set with `chunks`, attaching `embeddings`
    /// positionally (`None` entries are stored without a vector).
    ///
    /// Each stored chunk's metadata merges `metadata` (if given) with a
    /// storage-synthesized `chunk_index` and `indexed_at` timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk count and embedding count mismatch, or
    /// if any insert fails.
    fn index_document(
        &mut self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Option<Vec<f32>>],
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()>;

    /// Retrieves all chunks for a document, ordered by `chunk_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document_chunks(&self, document_id: &str) -> Result<Vec<StoredChunk>>;

    /// Retrieves all chunks for a document along with their embeddings
    /// (`None` where no embedding was stored), for in-process similarity
    /// scans.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document_chunks_with_embeddings(
        &self,
        document_id: &str,
    ) -> Result<Vec<(StoredChunk, Option<Vec<f32>>)>>;

    /// Retrieves every embedded chunk across all documents, for global
    /// (cross-document) semantic search.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_all_chunks_with_embeddings(&self) -> Result<Vec<(StoredChunk, Option<Vec<f32>>)>>;

    /// Removes a document's chunk embeddings without deleting the chunks
    /// themselves (used before re-indexing).
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_document_vectors(&mut self, document_id: &str) -> Result<()>;

    // ==================== Report Operations ====================

    /// Saves (or replaces) the completed analysis report for a document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    fn save_report(&mut self, document_id: &str, report: &Report) -> Result<()>;

    /// Retrieves the analysis report for a document, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or deserialization fails.
    fn get_report(&self, document_id: &str) -> Result<Option<Report>>;

    // ==================== Utility Operations ====================

    /// Gets per-document index statistics (chunk/embedding counts, whether
    /// a report exists).
    ///
    /// # Errors
    ///
    /// Returns an error if the queries fail.
    fn index_stats(&self, document_id: &str) -> Result<IndexStats>;

    /// Gets storage-wide statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    fn stats(&self) -> Result<StorageStats>;
}

/// Storage-wide statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedded_chunk_count: usize,
    pub report_count: usize,
    pub schema_version: u32,
    pub db_size: Option<u64>,
}
