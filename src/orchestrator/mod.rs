//! Map-reduce contract analysis pipeline (C4).
//!
//! Drives a document through structural chunking, bounded-concurrency
//! per-chunk risk extraction, consolidation into a single report, and
//! embedding-based indexing for later retrieval, reporting progress at
//! each stage transition.

mod map;
mod reduce;
mod state;

pub use state::{AnalysisState, ProgressEvent};

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chunking::{Chunker, StructuralChunker};
use crate::core::{Chunk, Report};
use crate::error::Result;
use crate::llm::{LlmClient, TextType};
use crate::storage::Storage;

/// Orchestrates the full per-document analysis pipeline.
pub struct AnalysisOrchestrator {
    llm: Arc<dyn LlmClient>,
    storage: Arc<Mutex<dyn Storage>>,
    chunker: StructuralChunker,
    concurrency: usize,
}

impl AnalysisOrchestrator {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, storage: Arc<Mutex<dyn Storage>>) -> Self {
        Self {
            llm,
            storage,
            chunker: StructuralChunker::default(),
            concurrency: map::MAP_CONCURRENCY,
        }
    }

    /// Overrides the map-phase concurrency (default [`map::MAP_CONCURRENCY`]).
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Runs the full pipeline for `document_id`/`text`, persisting the
    /// final report to storage. Embedding and indexing run in the
    /// background after the report is returned: a slow or failing
    /// embedding provider never delays or fails the analysis response.
    ///
    /// `on_progress` is called once per stage transition; implementations
    /// that stream progress (e.g. over SSE) can forward each event as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if chunking or saving the report fails. A failed
    /// or unparsable consolidation call does not fail the pipeline — it
    /// degrades to a report built from the chunk-level findings directly.
    pub async fn analyze(
        &self,
        document_id: &str,
        text: &str,
        mut on_progress: impl FnMut(ProgressEvent) + Send,
    ) -> Result<Report> {
        on_progress(ProgressEvent::new(AnalysisState::Chunking, 0.0, "正在拆分合同文本"));
        let chunks = match self.chunker.chunk(text) {
            Ok(chunks) => chunks,
            Err(err) => {
                on_progress(ProgressEvent::new(AnalysisState::Error, 0.0, "合同文本拆分失败"));
                return Err(err);
            }
        };

        on_progress(ProgressEvent::new(
            AnalysisState::Mapping,
            0.2,
            format!("共 {} 段，开始逐段风险提取", chunks.len()),
        ));
        let chunk_results = map::extract_all(&self.llm, &chunks, self.concurrency).await;

        on_progress(ProgressEvent::new(AnalysisState::Reducing, 0.6, "正在汇总风险结果"));
        let report = match reduce::consolidate(self.llm.as_ref(), chunk_results.clone(), chunks.len()).await {
            Ok(report) => report,
            Err(_) => {
                on_progress(ProgressEvent::new(
                    AnalysisState::ReducingDegraded,
                    0.7,
                    "模型汇总失败，已使用各分段识别结果生成报告",
                ));
                map::degraded_report(chunk_results)
            }
        };

        {
            let mut storage = self.storage.lock().await;
            storage.save_report(document_id, &report)?;
            storage.set_document_status(document_id, "complete")?;
        }

        on_progress(ProgressEvent::new(AnalysisState::Indexing, 0.9, "正在后台生成向量索引"));
        self.spawn_indexing(document_id.to_string(), chunks);

        on_progress(ProgressEvent::new(AnalysisState::Complete, 1.0, "分析完成"));
        Ok(report)
    }

    /// Fires off embedding and indexing as a detached task. Indexing
    /// completion does not gate the analysis response — failures are
    /// logged and otherwise swallowed, since a later query or reindex
    /// call can always recover a missing index.
    fn spawn_indexing(&self, document_id: String, chunks: Vec<Chunk>) {
        let llm = Arc::clone(&self.llm);
        let storage = Arc::clone(&self.storage);
        tokio::spawn(async move {
            if let Err(err) = Self::index_chunks(&llm, &storage, &document_id, &chunks).await {
                tracing::warn!(document_id = %document_id, error = %err, "background chunk indexing failed");
            }
        });
    }

    async fn index_chunks(
        llm: &Arc<dyn LlmClient>,
        storage: &Mutex<dyn Storage>,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = llm.embed_batch(&texts, TextType::Document).await?;
        storage.lock().await.index_document(document_id, chunks, &embeddings, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::storage::SqliteStorage;

    fn contract_text() -> String {
        "第一条 保密义务\n双方应对本合同内容及商业秘密予以保密，不得向第三方披露。\n\n\
         第二条 违约责任\n任何一方违反本合同约定的，应承担相应的违约责任并赔偿损失。\n"
            .to_string()
    }

    #[tokio::test]
    async fn test_analyze_completes_and_persists_report_even_without_scripted_responses() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new());
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, &contract_text()).unwrap();
        let storage: Arc<Mutex<dyn Storage>> = Arc::new(Mutex::new(storage));
        let orchestrator = AnalysisOrchestrator::new(llm, Arc::clone(&storage));

        let mut stages = Vec::new();
        let report = orchestrator
            .analyze("doc-1", &contract_text(), |event| {
                stages.push(event.stage);
            })
            .await
            .unwrap();

        assert_eq!(report.risks.len(), 0, "no scripted chat responses means no extracted risks");
        assert!(stages.contains(&"complete".to_string()));
        assert!(storage.lock().await.get_report("doc-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_analyze_returns_report_without_waiting_on_indexing() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new());
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage.save_document("doc-1", None, &contract_text()).unwrap();
        let storage: Arc<Mutex<dyn Storage>> = Arc::new(Mutex::new(storage));
        let orchestrator = AnalysisOrchestrator::new(llm, Arc::clone(&storage));

        let report = orchestrator.analyze("doc-1", &contract_text(), |_event| {}).await.unwrap();
        assert!(report.score <= 100);

        // The report is persisted synchronously even though indexing is
        // still running in the background at this point.
        assert!(storage.lock().await.get_report("doc-1").unwrap().is_some());
    }
}
