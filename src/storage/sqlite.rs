//! `SQLite` storage implementation.
//!
//! Persists documents, their structural chunks, chunk embeddings, and
//! completed analysis reports, with WAL mode for concurrent readers during
//! long-running analyses.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{Chunk, Importance, Report, SegmentType};
use crate::error::{Result, StorageError};
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use crate::storage::traits::{DocumentRecord, IndexStats, Storage, StorageStats, StoredChunk};

/// SQLite-based storage implementation.
pub struct SqliteStorage {
    conn: Connection,
    path: Option<PathBuf>,
}

// `rusqlite::Connection` holds internal `RefCell` state (statement cache),
// making it `Send` but not `Sync`. Every access to `SqliteStorage` is
// already serialized behind an external `tokio::sync::Mutex` (see
// `AppState::storage`), so no two threads ever touch `conn` concurrently.
unsafe impl Sync for SqliteStorage {}

impl SqliteStorage {
    /// Opens or creates a `SQLite` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", []).map_err(StorageError::from)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Creates an in-memory `SQLite` database. Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", []).map_err(StorageError::from)?;
        Ok(Self { conn, path: None })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn get_schema_version(&self) -> Result<Option<u32>> {
        let version: Option<String> = self
            .conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;
        Ok(version.and_then(|v| v.parse().ok()))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StorageError::from)?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn row_to_stored_chunk(
        document_id: String,
        id: i64,
        content: String,
        chunk_index: i64,
        token_estimate: i64,
        segments_json: String,
        importance_str: String,
        has_overlap: i64,
        metadata_json: String,
    ) -> Result<StoredChunk> {
        let segments: Vec<SegmentType> = serde_json::from_str(&segments_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let importance = match importance_str.as_str() {
            "high" => Importance::High,
            "low" => Importance::Low,
            _ => Importance::Normal,
        };
        let metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let chunk = Chunk {
            content,
            token_estimate: token_estimate as usize,
            segments,
            importance,
            has_overlap: has_overlap != 0,
            chunk_index: chunk_index as usize,
        };
        Ok(StoredChunk {
            id,
            document_id,
            chunk,
            metadata,
        })
    }

    /// Builds a chunk's stored metadata: caller-supplied keys merged with a
    /// storage-synthesized `chunk_index` and `indexed_at` timestamp.
    fn build_chunk_metadata(
        caller_metadata: Option<&serde_json::Map<String, serde_json::Value>>,
        chunk_index: usize,
        indexed_at: i64,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut metadata = caller_metadata.cloned().unwrap_or_default();
        metadata.insert("chunk_index".to_string(), serde_json::json!(chunk_index));
        metadata.insert("indexed_at".to_string(), serde_json::json!(indexed_at));
        metadata
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl Storage for SqliteStorage {
    fn init(&mut self) -> Result<()> {
        let is_init: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;

        if is_init == 0 {
            self.conn.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    fn save_document(
        &mut self,
        document_id: &str,
        filename: Option<&str>,
        content: &str,
    ) -> Result<()> {
        let now = Self::now();
        self.conn
            .execute(
                "INSERT INTO documents (id, filename, content, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'uploaded', ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    filename = excluded.filename,
                    content = excluded.content,
                    updated_at = excluded.updated_at",
                params![document_id, filename, content, now],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        self.conn
            .query_row(
                "SELECT id, filename, content, status FROM documents WHERE id = ?1",
                params![document_id],
                |row| {
                    Ok(DocumentRecord {
                        id: row.get(0)?,
                        filename: row.get(1)?,
                        content: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
    }

    fn set_document_status(&mut self, document_id: &str, status: &str) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status, Self::now(), document_id],
            )
            .map_err(StorageError::from)?;
        if updated == 0 {
            return Err(StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn delete_document(&mut self, document_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn index_document(
        &mut self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Option<Vec<f32>>],
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(StorageError::Serialization(
                "chunk count and embedding count must match".to_string(),
            )
            .into());
        }

        let tx = self.conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(StorageError::from)?;

        let now = Self::now();
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let segments_json = serde_json::to_string(&chunk.segments)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            let importance = match chunk.importance {
                Importance::High => "high",
                Importance::Normal => "normal",
                Importance::Low => "low",
            };
            let chunk_metadata = Self::build_chunk_metadata(metadata, chunk.chunk_index, now);
            let metadata_json = serde_json::to_string(&chunk_metadata)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO chunks
                    (document_id, content, chunk_index, token_estimate, segments,
                     importance, has_overlap, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    document_id,
                    chunk.content,
                    chunk.chunk_index as i64,
                    chunk.token_estimate as i64,
                    segments_json,
                    importance,
                    i64::from(chunk.has_overlap),
                    metadata_json,
                    now,
                ],
            )
            .map_err(StorageError::from)?;
            let chunk_id = tx.last_insert_rowid();

            if let Some(vector) = embedding {
                let blob = Self::embedding_to_blob(vector);
                tx.execute(
                    "INSERT INTO chunk_embeddings (chunk_id, embedding, dimensions, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![chunk_id, blob, vector.len() as i64, now],
                )
                .map_err(StorageError::from)?;
            }
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn get_document_chunks(&self, document_id: &str) -> Result<Vec<StoredChunk>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, content, chunk_index, token_estimate, segments, importance, has_overlap, metadata
                 FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
            )
            .map_err(StorageError::from)?;

        let rows = stmt
            .query_map(params![document_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(StorageError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let (id, content, chunk_index, token_estimate, segments, importance, has_overlap, metadata) =
                row.map_err(StorageError::from)?;
            out.push(Self::row_to_stored_chunk(
                document_id.to_string(),
                id,
                content,
                chunk_index,
                token_estimate,
                segments,
                importance,
                has_overlap,
                metadata,
            )?);
        }
        Ok(out)
    }

    fn get_document_chunks_with_embeddings(
        &self,
        document_id: &str,
    ) -> Result<Vec<(StoredChunk, Option<Vec<f32>>)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.content, c.chunk_index, c.token_estimate, c.segments,
                        c.importance, c.has_overlap, c.metadata, e.embedding
                 FROM chunks c
                 LEFT JOIN chunk_embeddings e ON e.chunk_id = c.id
                 WHERE c.document_id = ?1
                 ORDER BY c.chunk_index ASC",
            )
            .map_err(StorageError::from)?;

        let rows = stmt
            .query_map(params![document_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<Vec<u8>>>(8)?,
                ))
            })
            .map_err(StorageError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let (id, content, chunk_index, token_estimate, segments, importance, has_overlap, metadata, blob) =
                row.map_err(StorageError::from)?;
            let stored = Self::row_to_stored_chunk(
                document_id.to_string(),
                id,
                content,
                chunk_index,
                token_estimate,
                segments,
                importance,
                has_overlap,
                metadata,
            )?;
            out.push((stored, blob.map(|b| Self::blob_to_embedding(&b))));
        }
        Ok(out)
    }

    fn get_all_chunks_with_embeddings(&self) -> Result<Vec<(StoredChunk, Option<Vec<f32>>)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.document_id, c.content, c.chunk_index, c.token_estimate,
                        c.segments, c.importance, c.has_overlap, c.metadata, e.embedding
                 FROM chunks c
                 LEFT JOIN chunk_embeddings e ON e.chunk_id = c.id
                 ORDER BY c.document_id ASC, c.chunk_index ASC",
            )
            .map_err(StorageError::from)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<Vec<u8>>>(9)?,
                ))
            })
            .map_err(StorageError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let (
                id,
                document_id,
                content,
                chunk_index,
                token_estimate,
                segments,
                importance,
                has_overlap,
                metadata,
                blob,
            ) = row.map_err(StorageError::from)?;
            let stored = Self::row_to_stored_chunk(
                document_id,
                id,
                content,
                chunk_index,
                token_estimate,
                segments,
                importance,
                has_overlap,
                metadata,
            )?;
            out.push((stored, blob.map(|b| Self::blob_to_embedding(&b))));
        }
        Ok(out)
    }

    fn delete_document_vectors(&mut self, document_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM chunk_embeddings
                 WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)",
                params![document_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn save_report(&mut self, document_id: &str, report: &Report) -> Result<()> {
        let json = serde_json::to_string(report).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Self::now();
        self.conn
            .execute(
                "INSERT INTO reports (document_id, report_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(document_id) DO UPDATE SET
                    report_json = excluded.report_json,
                    updated_at = excluded.updated_at",
                params![document_id, json, now],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn get_report(&self, document_id: &str) -> Result<Option<Report>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT report_json FROM reports WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;

        json.map(|j| serde_json::from_str(&j).map_err(|e| StorageError::Serialization(e.to_string()).into()))
            .transpose()
    }

    fn index_stats(&self, document_id: &str) -> Result<IndexStats> {
        let chunk_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;

        let embedded_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunk_embeddings e
                 JOIN chunks c ON c.id = e.chunk_id
                 WHERE c.document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;

        let has_report: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM reports WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;

        Ok(IndexStats {
            chunk_count: chunk_count as usize,
            embedded_count: embedded_count as usize,
            has_report: has_report > 0,
        })
    }

    fn stats(&self) -> Result<StorageStats> {
        let document_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        let chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        let embedded_chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        let report_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        let schema_version = self.get_schema_version()?.unwrap_or(0);
        let db_size = self.path.as_ref().and_then(|p| std::fs::metadata(p).ok()).map(|m| m.len());

        Ok(StorageStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedded_chunk_count: embedded_chunk_count as usize,
            report_count: report_count as usize,
            schema_version,
            db_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SegmentType;

    fn sample_chunk(index: usize) -> Chunk {
        Chunk::new(
            format!("第{index}条 测试条款内容，足够长以通过校验。"),
            vec![SegmentType::Article],
            Importance::High,
            false,
            index,
        )
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.init().unwrap();
        assert!(storage.is_initialized().unwrap());
    }

    #[test]
    fn test_save_and_get_document() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", Some("contract.pdf"), "正文内容").unwrap();

        let doc = storage.get_document("doc-1").unwrap().unwrap();
        assert_eq!(doc.filename.as_deref(), Some("contract.pdf"));
        assert_eq!(doc.status, "uploaded");
    }

    #[test]
    fn test_get_document_missing_returns_none() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        assert!(storage.get_document("nope").unwrap().is_none());
    }

    #[test]
    fn test_set_document_status_missing_document_errors() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        assert!(storage.set_document_status("missing", "complete").is_err());
    }

    #[test]
    fn test_index_document_round_trips_chunks_and_embeddings() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();

        let chunks = vec![sample_chunk(0), sample_chunk(1)];
        let embeddings = vec![Some(vec![0.1_f32; 4]), None];
        storage.index_document("doc-1", &chunks, &embeddings, None).unwrap();

        let stored = storage.get_document_chunks("doc-1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].chunk.chunk_index, 0);

        let with_embeddings = storage.get_document_chunks_with_embeddings("doc-1").unwrap();
        assert!(with_embeddings[0].1.is_some());
        assert!(with_embeddings[1].1.is_none());
        assert_eq!(with_embeddings[0].1.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn test_index_document_rejects_length_mismatch() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();
        let chunks = vec![sample_chunk(0)];
        assert!(storage.index_document("doc-1", &chunks, &[], None).is_err());
    }

    #[test]
    fn test_index_document_merges_caller_metadata_with_chunk_index_and_indexed_at() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();

        let mut caller_metadata = serde_json::Map::new();
        caller_metadata.insert("source".to_string(), serde_json::json!("upload"));
        storage
            .index_document("doc-1", &[sample_chunk(0)], &[None], Some(&caller_metadata))
            .unwrap();

        let stored = storage.get_document_chunks("doc-1").unwrap();
        assert_eq!(stored[0].metadata["source"], serde_json::json!("upload"));
        assert_eq!(stored[0].metadata["chunk_index"], serde_json::json!(0));
        assert!(stored[0].metadata.contains_key("indexed_at"));
    }

    #[test]
    fn test_delete_document_vectors_preserves_chunks() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();
        let chunks = vec![sample_chunk(0)];
        storage.index_document("doc-1", &chunks, &[Some(vec![0.1; 4])], None).unwrap();

        storage.delete_document_vectors("doc-1").unwrap();
        let with_embeddings = storage.get_document_chunks_with_embeddings("doc-1").unwrap();
        assert_eq!(with_embeddings.len(), 1);
        assert!(with_embeddings[0].1.is_none());
    }

    #[test]
    fn test_delete_document_cascades() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();
        storage.index_document("doc-1", &[sample_chunk(0)], &[None], None).unwrap();

        storage.delete_document("doc-1").unwrap();
        assert!(storage.get_document("doc-1").unwrap().is_none());
        assert!(storage.get_document_chunks("doc-1").unwrap().is_empty());
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let original = vec![0.5_f32, -1.25, 3.0];
        let blob = SqliteStorage::embedding_to_blob(&original);
        let back = SqliteStorage::blob_to_embedding(&blob);
        assert_eq!(original, back);
    }

    #[test]
    fn test_stats_reflect_inserted_data() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();
        storage.index_document("doc-1", &[sample_chunk(0)], &[Some(vec![0.1; 4])], None).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.embedded_chunk_count, 1);
    }

    #[test]
    fn test_index_stats_for_document() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, "正文").unwrap();
        storage.index_document("doc-1", &[sample_chunk(0)], &[None], None).unwrap();

        let stats = storage.index_stats("doc-1").unwrap();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.embedded_count, 0);
        assert!(!stats.has_report);
    }
}
