//! Retrieval and grounded question answering (C5).
//!
//! Vector retrieval here is an in-process cosine-similarity scan over
//! embeddings read from storage — there is no external vector index, so the
//! "fallback" scan is the only search path, scoped either to a single
//! document or across the whole store.

use std::time::Duration;

use crate::core::{estimate_tokens, Chunk};
use crate::error::Result;
use crate::llm::{ChatRequest, LlmClient, TextType};
use crate::llm::prompts::{rag_system_prompt, rag_user_prompt};
use crate::storage::Storage;

/// Default number of chunks retrieved for a query.
pub const DEFAULT_TOP_K: usize = 5;

/// Minimum cosine similarity for a chunk to be considered relevant.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Default token budget for assembled RAG context.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4_000;

/// Length, in chars, of the excerpt reported for each source chunk.
const SOURCE_EXCERPT_CHARS: usize = 200;

/// A chunk retrieved for a query, with its similarity score.
#[derive(Debug, Clone)]
pub struct MatchedChunk {
    pub document_id: String,
    pub chunk: Chunk,
    pub score: f32,
}

/// A source chunk cited alongside a [`RagAnswer`]: its leading excerpt and
/// the similarity score it was retrieved at.
#[derive(Debug, Clone)]
pub struct RagSource {
    pub excerpt: String,
    pub score: f32,
}

/// The result of a grounded question-answering query.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    /// Mean similarity score across the chunks actually used to ground the
    /// answer (i.e. those that fit within the context token budget).
    pub confidence: f32,
    /// Chunks the answer was grounded on, in relevance order.
    pub sources: Vec<RagSource>,
    /// Estimated token count of the assembled context sent to the model.
    pub context_tokens: usize,
}

/// Cosine similarity between two vectors. Returns `0.0` for mismatched
/// lengths, empty vectors, or a zero-magnitude vector, rather than dividing
/// by zero or panicking.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Scans every embedded chunk in a single document, returning the top
/// `limit` matches with similarity above `threshold`, most similar first.
///
/// # Errors
///
/// Returns an error if storage cannot be queried.
pub fn match_documents_in_doc(
    storage: &dyn Storage,
    document_id: &str,
    query_embedding: &[f32],
    threshold: f32,
    limit: usize,
) -> Result<Vec<MatchedChunk>> {
    let candidates = storage.get_document_chunks_with_embeddings(document_id)?;
    Ok(rank_matches(candidates, query_embedding, threshold, limit))
}

/// Scans every embedded chunk across all documents, returning the top
/// `limit` matches with similarity above `threshold`, most similar first.
///
/// # Errors
///
/// Returns an error if storage cannot be queried.
pub fn match_documents(
    storage: &dyn Storage,
    query_embedding: &[f32],
    threshold: f32,
    limit: usize,
) -> Result<Vec<MatchedChunk>> {
    let candidates = storage.get_all_chunks_with_embeddings()?;
    Ok(rank_matches(candidates, query_embedding, threshold, limit))
}

fn rank_matches(
    candidates: Vec<(crate::storage::StoredChunk, Option<Vec<f32>>)>,
    query_embedding: &[f32],
    threshold: f32,
    limit: usize,
) -> Vec<MatchedChunk> {
    let mut scored: Vec<MatchedChunk> = candidates
        .into_iter()
        .filter_map(|(stored, embedding)| {
            let embedding = embedding?;
            let score = cosine_similarity(query_embedding, &embedding);
            (score >= threshold).then_some(MatchedChunk {
                document_id: stored.document_id,
                chunk: stored.chunk,
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Greedily assembles `matches` (already in similarity order) into the RAG
/// prompt context: each chunk's content is prefixed with its similarity
/// percentage, and chunks stop being appended once the cumulative estimated
/// token count would exceed `max_context_tokens`. At least one chunk is
/// always included when `matches` is non-empty, even if it alone exceeds
/// the budget.
///
/// Returns the assembled context string alongside the subset of `matches`
/// that made it in.
#[must_use]
pub fn build_context(matches: &[MatchedChunk], max_context_tokens: usize) -> (String, Vec<MatchedChunk>) {
    let mut context = String::new();
    let mut selected = Vec::new();
    let mut tokens_used = 0usize;

    for matched in matches {
        let piece = format!("\n\n---\n[相关度: {:.1}%]\n{}", matched.score * 100.0, matched.chunk.content);
        let piece_tokens = estimate_tokens(&piece);
        if !selected.is_empty() && tokens_used + piece_tokens > max_context_tokens {
            break;
        }
        context.push_str(&piece);
        tokens_used += piece_tokens;
        selected.push(matched.clone());
    }

    (context, selected)
}

/// Answers `question`, grounded only in retrieved chunks from `document_id`
/// (or the whole store, if `None`).
///
/// # Errors
///
/// Returns an error if embedding the question or calling the chat model
/// fails.
pub async fn query(
    storage: &dyn Storage,
    llm: &dyn LlmClient,
    document_id: Option<&str>,
    question: &str,
    threshold: f32,
    top_k: usize,
) -> Result<RagAnswer> {
    let query_embedding = llm.embed(question, TextType::Query).await?;

    let matches = match document_id {
        Some(id) => match_documents_in_doc(storage, id, &query_embedding, threshold, top_k)?,
        None => match_documents(storage, &query_embedding, threshold, top_k)?,
    };

    let (context, selected) = build_context(&matches, DEFAULT_MAX_CONTEXT_TOKENS);

    if selected.is_empty() {
        return Ok(RagAnswer {
            answer: "未能在合同中找到与该问题相关的内容。".to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            context_tokens: 0,
        });
    }

    let confidence = selected.iter().map(|m| m.score).sum::<f32>() / selected.len() as f32;
    let sources = selected
        .iter()
        .map(|m| RagSource {
            excerpt: m.chunk.content.chars().take(SOURCE_EXCERPT_CHARS).collect(),
            score: m.score,
        })
        .collect();
    let context_tokens = estimate_tokens(&context);

    let request = ChatRequest::new(rag_system_prompt(), rag_user_prompt(question, &context))
        .timeout(Duration::from_secs(60))
        .max_retries(2);
    let output = llm.chat(request).await?;

    Ok(RagAnswer {
        answer: output.text,
        confidence,
        sources,
        context_tokens,
    })
}
