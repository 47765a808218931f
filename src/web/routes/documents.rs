//! Document lifecycle routes: upload, analysis (sync and streaming),
//! retrieval-grounded Q&A, reindexing, index stats, export, and one-shot
//! drafting assists.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::chunking::{Chunker, StructuralChunker};
use crate::core::{detect_language, estimate_tokens, Annotation, Report};
use crate::llm::{AssistAction, ChatRequest, TextType};
use crate::llm::prompts::assist_system_prompt;
use crate::orchestrator::ProgressEvent;
use crate::search;
use crate::storage::Storage;
use crate::web::export::render_report;
use crate::web::error::{Result, WebError};
use crate::web::state::AppState;

// --- POST /documents/upload -------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadAnalysis {
    language: String,
    char_count: usize,
    estimated_tokens: usize,
    chunk_count: usize,
    avg_chunk_tokens: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    id: String,
    name: String,
    status: String,
    content: String,
    analysis: UploadAnalysis,
}

/// `POST /documents/upload` — accepts a `multipart/form-data` body with a
/// `file` field, registers the document, and returns an immediate
/// structural profile of its text.
///
/// Extraction from binary formats (PDF, DOCX) is out of scope here; the
/// uploaded bytes are decoded as UTF-8 text directly.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>> {
    let mut filename = None;
    let mut content = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| WebError::BadRequest(err.to_string()))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(ToString::to_string);
            let bytes = field.bytes().await.map_err(|err| WebError::BadRequest(err.to_string()))?;
            content = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
    }

    let content = content.ok_or_else(|| WebError::BadRequest("missing 'file' field".to_string()))?;
    if content.trim().is_empty() {
        return Err(WebError::BadRequest("uploaded file is empty".to_string()));
    }

    let chunks = StructuralChunker::default().chunk(&content)?;
    let chunk_count = chunks.len();
    let avg_chunk_tokens = if chunk_count == 0 {
        0
    } else {
        chunks.iter().map(|c| c.token_estimate).sum::<usize>() / chunk_count
    };

    let document_id = Uuid::new_v4().to_string();
    let name = filename.unwrap_or_else(|| "untitled".to_string());
    {
        let mut storage = state.storage.lock().await;
        storage.save_document(&document_id, Some(name.as_str()), &content)?;
    }

    Ok(Json(UploadResponse {
        id: document_id,
        name,
        status: "ready".to_string(),
        analysis: UploadAnalysis {
            language: detect_language(&content).code().to_string(),
            char_count: content.chars().count(),
            estimated_tokens: estimate_tokens(&content),
            chunk_count,
            avg_chunk_tokens,
        },
        content,
    }))
}

// --- POST /documents/analyze-sync/{id} --------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct AnalyzeRequest {
    text: String,
    #[serde(default)]
    document_id: String,
}

fn resolve_document_id(path_id: String, body_id: String) -> String {
    if body_id.is_empty() {
        path_id
    } else {
        body_id
    }
}

/// `POST /documents/analyze-sync/{id}` — runs the full pipeline and returns
/// the report. Always responds `200` with a valid [`Report`]: a failed
/// reduce-phase call degrades to a chunk-level summary rather than erroring.
pub async fn analyze_sync(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Report>> {
    if req.text.trim().is_empty() {
        return Err(WebError::BadRequest("text must not be empty".to_string()));
    }
    let document_id = resolve_document_id(id, req.document_id);

    {
        let mut storage = state.storage.lock().await;
        if storage.get_document(&document_id)?.is_none() {
            storage.save_document(&document_id, None, &req.text)?;
        }
    }
    let report = state.orchestrator.analyze(&document_id, &req.text, |_event| {}).await?;
    Ok(Json(report))
}

// --- POST /documents/analyze/{id} (SSE) -------------------------------------

#[derive(Debug, Serialize)]
struct SseFrame {
    stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SseFrame {
    fn progress(event: ProgressEvent) -> Self {
        Self {
            stage: event.stage,
            progress: Some(event.progress * 100.0),
            message: Some(event.message),
            data: None,
            error: None,
        }
    }

    fn result(report: Report) -> Self {
        Self {
            stage: "result".to_string(),
            progress: Some(100.0),
            message: None,
            data: Some(report),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            stage: "error".to_string(),
            progress: None,
            message: None,
            data: None,
            error: Some(message),
        }
    }

    fn to_event(&self) -> Event {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Event::default().data(payload)
    }
}

/// `POST /documents/analyze/{id}` — same inputs as the sync route, but
/// streams `{stage, progress, message}` frames as the pipeline advances,
/// ending in a `result` frame carrying the full report or an `error` frame.
pub async fn analyze_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AnalyzeRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<SseFrame>(32);
    let document_id = resolve_document_id(id, req.document_id);
    let text = req.text;

    tokio::spawn(async move {
        {
            let mut storage = state.storage.lock().await;
            if matches!(storage.get_document(&document_id), Ok(None)) {
                let _ = storage.save_document(&document_id, None, &text);
            }
        }

        let result = state
            .orchestrator
            .analyze(&document_id, &text, |event| {
                // Progress callback is synchronous; a full channel just
                // drops the intermediate frame rather than blocking.
                let _ = tx.try_send(SseFrame::progress(event));
            })
            .await;

        let frame = match result {
            Ok(report) => SseFrame::result(report),
            Err(err) => SseFrame::error(err.to_string()),
        };
        let _ = tx.send(frame).await;
    });

    let stream = ReceiverStream::new(rx).map(|frame| Ok(frame.to_event()));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// --- POST /documents/query ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct QueryRequest {
    question: String,
    document_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuerySource {
    excerpt: String,
    score: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponse {
    answer: String,
    sources: Vec<QuerySource>,
    confidence: f32,
    context_tokens: usize,
}

/// `POST /documents/query` — answers a question grounded in a document's
/// (or the whole store's) indexed chunks.
pub async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Result<Json<QueryResponse>> {
    if req.question.trim().is_empty() {
        return Err(WebError::BadRequest("question must not be empty".to_string()));
    }

    let storage = state.storage.lock().await;
    let answer = search::query(
        &*storage,
        state.llm.as_ref(),
        req.document_id.as_deref(),
        &req.question,
        search::DEFAULT_SIMILARITY_THRESHOLD,
        search::DEFAULT_TOP_K,
    )
    .await?;

    Ok(Json(QueryResponse {
        answer: answer.answer,
        sources: answer.sources.into_iter().map(|s| QuerySource { excerpt: s.excerpt, score: s.score }).collect(),
        confidence: answer.confidence,
        context_tokens: answer.context_tokens,
    }))
}

// --- POST /documents/reindex/{id} -------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ReindexRequest {
    text: String,
}

/// `POST /documents/reindex/{id}` — re-chunks and re-embeds a document's
/// text, replacing its prior chunk and embedding set.
pub async fn reindex(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReindexRequest>,
) -> Result<Json<crate::storage::IndexStats>> {
    if req.text.trim().is_empty() {
        return Err(WebError::BadRequest("text must not be empty".to_string()));
    }

    let chunks = StructuralChunker::default().chunk(&req.text)?;
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = state
        .llm
        .embed_batch(&texts, TextType::Document)
        .await
        .map_err(crate::error::Error::from)?;

    let mut storage = state.storage.lock().await;
    storage.index_document(&id, &chunks, &embeddings, None)?;
    let stats = storage.index_stats(&id)?;
    Ok(Json(stats))
}

// --- GET /documents/index-stats/{id} ----------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexStatsResponse {
    total_chunks: usize,
    indexed_chunks: usize,
    is_fully_indexed: bool,
}

/// `GET /documents/index-stats/{id}` — reports how much of a document is
/// currently embedded.
pub async fn index_stats(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<IndexStatsResponse>> {
    let storage = state.storage.lock().await;
    let stats = storage.index_stats(&id)?;
    Ok(Json(IndexStatsResponse {
        is_fully_indexed: stats.chunk_count > 0 && stats.embedded_count == stats.chunk_count,
        total_chunks: stats.chunk_count,
        indexed_chunks: stats.embedded_count,
    }))
}

// --- POST /documents/export-docx --------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportRequest {
    report: Report,
    content: String,
    #[serde(default)]
    annotations: Vec<Annotation>,
    file_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportResponse {
    content: String,
    file_name: String,
}

/// `POST /documents/export-docx` — formats a report (plus its source
/// annotations) as the flat text a client converts into a `.docx` file.
pub async fn export_docx(Json(req): Json<ExportRequest>) -> Result<Json<ExportResponse>> {
    let content = render_report(&req.report, &req.content, &req.annotations);
    Ok(Json(ExportResponse {
        content,
        file_name: req.file_name,
    }))
}

// --- POST /documents/assist --------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct AssistRequest {
    text: String,
    action: AssistAction,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssistResponse {
    result: String,
}

/// `POST /documents/assist` — a single-shot drafting aid (summary, term
/// extraction, translation, or clause comparison) over an arbitrary excerpt.
pub async fn assist(State(state): State<AppState>, Json(req): Json<AssistRequest>) -> Result<Json<AssistResponse>> {
    if req.text.trim().is_empty() {
        return Err(WebError::BadRequest("text must not be empty".to_string()));
    }

    let request = ChatRequest::new(assist_system_prompt(req.action), req.text)
        .timeout(Duration::from_secs(60))
        .max_retries(2);
    let output = state.llm.chat(request).await.map_err(crate::error::Error::from)?;
    Ok(Json(AssistResponse { result: output.text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_document_id_prefers_body_when_present() {
        assert_eq!(resolve_document_id("path-id".to_string(), "body-id".to_string()), "body-id");
        assert_eq!(resolve_document_id("path-id".to_string(), String::new()), "path-id");
    }

    #[test]
    fn test_sse_frame_serializes_progress_without_data_or_error() {
        let frame = SseFrame::progress(ProgressEvent::new(
            crate::orchestrator::AnalysisState::Mapping,
            0.2,
            "开始提取",
        ));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["stage"], "mapping");
        assert!(json.get("data").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_sse_frame_error_has_no_progress() {
        let frame = SseFrame::error("boom".to_string());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["stage"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json.get("progress").is_none());
    }
}
