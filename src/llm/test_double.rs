//! In-memory [`LlmClient`] test double: scripted chat responses and
//! deterministic hash-based embeddings, so orchestrator and web-layer tests
//! don't depend on a network endpoint.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{ChatOutput, ChatRequest, LlmClient, TextType, EMBEDDING_DIMENSIONS};
use crate::error::LlmError;

/// A scripted, in-process [`LlmClient`].
///
/// Chat responses are served from a FIFO queue of canned [`ChatOutput`]s
/// (or errors); once exhausted, calls return [`LlmError::RetriesExhausted`].
/// Embeddings are deterministic: the same text always yields the same
/// vector, derived from a hash of its content rather than a real model.
pub struct ScriptedLlmClient {
    responses: Mutex<Vec<Result<ChatOutput, LlmError>>>,
}

impl ScriptedLlmClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
        }
    }

    /// Queues a chat response to be returned in order (FIFO).
    #[must_use]
    pub fn with_response(self, output: ChatOutput) -> Self {
        self.lock_responses().push(Ok(output));
        self
    }

    /// Queues a chat error to be returned in order (FIFO).
    #[must_use]
    pub fn with_error(self, err: LlmError) -> Self {
        self.lock_responses().push(Err(err));
        self
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, Vec<Result<ChatOutput, LlmError>>> {
        self.responses.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives a deterministic unit-ish vector from `text`'s hash. Not a real
/// embedding — only useful for exercising cosine-similarity plumbing in
/// tests, where distinct inputs should deterministically yield distinct,
/// reproducible vectors.
#[must_use]
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = Vec::with_capacity(EMBEDDING_DIMENSIONS);
    let mut seed = {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    };
    for _ in 0..EMBEDDING_DIMENSIONS {
        // xorshift64 for a cheap, deterministic pseudo-random sequence.
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let component = (seed % 2000) as f32 / 1000.0 - 1.0;
        vector.push(component);
    }
    vector
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatOutput, LlmError> {
        let mut responses = self.lock_responses();
        if responses.is_empty() {
            return Err(LlmError::RetriesExhausted { attempts: 0 });
        }
        responses.remove(0)
    }

    async fn embed(&self, text: &str, _text_type: TextType) -> Result<Vec<f32>, LlmError> {
        Ok(hash_embedding(text))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _text_type: TextType,
    ) -> Result<Vec<Option<Vec<f32>>>, LlmError> {
        Ok(texts.iter().map(|t| Some(hash_embedding(t))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedding_is_deterministic() {
        let a = hash_embedding("条款一：甲方应支付款项");
        let b = hash_embedding("条款一：甲方应支付款项");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedding_distinguishes_inputs() {
        let a = hash_embedding("条款一");
        let b = hash_embedding("条款二");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_embedding_has_expected_dimensions() {
        assert_eq!(hash_embedding("text").len(), EMBEDDING_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_scripted_client_returns_queued_responses_in_order() {
        let client = ScriptedLlmClient::new()
            .with_response(ChatOutput {
                text: "first".to_string(),
                json: None,
            })
            .with_response(ChatOutput {
                text: "second".to_string(),
                json: None,
            });

        let first = client.chat(ChatRequest::new("sys", "user")).await.unwrap();
        assert_eq!(first.text, "first");
        let second = client.chat(ChatRequest::new("sys", "user")).await.unwrap();
        assert_eq!(second.text, "second");
    }

    #[tokio::test]
    async fn test_scripted_client_errors_when_queue_exhausted() {
        let client = ScriptedLlmClient::new();
        let result = client.chat(ChatRequest::new("sys", "user")).await;
        assert!(matches!(result, Err(LlmError::RetriesExhausted { .. })));
    }

    #[tokio::test]
    async fn test_scripted_client_embed_is_deterministic() {
        let client = ScriptedLlmClient::new();
        let a = client.embed("hello", TextType::Document).await.unwrap();
        let b = client.embed("hello", TextType::Document).await.unwrap();
        assert_eq!(a, b);
    }
}
