//! Chat-completion and embedding transport with retries, backoff, JSON-mode
//! parsing, and a shared connection pool.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LlmError;

/// Which embedding mode to request: affects the embedding model's internal
/// representation for documents vs. search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    Document,
    Query,
}

impl TextType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

/// Embedding vector width. Implementers must match the configured embedding
/// model's output dimensionality.
pub const EMBEDDING_DIMENSIONS: usize = 1024;

/// Maximum characters sent per embedding request.
const EMBEDDING_CHAR_LIMIT: usize = 8_000;

/// Embedding batch size and inter-batch pause.
const EMBEDDING_BATCH_SIZE: usize = 10;
const EMBEDDING_BATCH_PAUSE: Duration = Duration::from_millis(200);

/// A chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
    pub model: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub max_content_chars: usize,
    pub timeout: Duration,
}

impl ChatRequest {
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            json_mode: false,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_retries: 2,
            max_content_chars: 100_000,
            timeout: Duration::from_secs(90),
        }
    }

    #[must_use]
    pub const fn json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// A chat-completion result: the raw text, plus a parsed JSON value when
/// `json_mode` was requested.
#[derive(Debug, Clone)]
pub struct ChatOutput {
    pub text: String,
    pub json: Option<Value>,
}

/// Chat-completion and embedding operations (C3).
///
/// A narrow trait with two implementations: [`HttpLlmClient`] for
/// production, and [`super::test_double::ScriptedLlmClient`] for tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issues a chat-completion request with retries and backoff.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] after the retry budget is exhausted, or
    /// immediately on a non-retried upstream 4xx / JSON-parse failure.
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutput, LlmError>;

    /// Embeds a single piece of text, truncated to 8,000 characters.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the embedding request fails after retries.
    async fn embed(&self, text: &str, text_type: TextType) -> Result<Vec<f32>, LlmError>;

    /// Embeds a batch of texts in groups of 10 with a pause between groups.
    ///
    /// On a group-level failure, falls back to per-text embedding; texts
    /// that still fail are represented as `None` rather than failing the
    /// whole batch.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] only if the per-text fallback itself cannot be
    /// attempted (never for individual embedding failures).
    async fn embed_batch(
        &self,
        texts: &[String],
        text_type: TextType,
    ) -> Result<Vec<Option<Vec<f32>>>, LlmError>;
}

/// Truncates `text` to at most `max_chars` characters, appending a
/// truncation marker when it was cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("\n...[内容已截断]");
    truncated
}

/// Finds the first balanced `{...}` substring in `text`, respecting quoted
/// strings so braces inside string literals don't unbalance the count.
#[must_use]
pub fn extract_balanced_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses `body` as JSON when `json_mode` is set: strict parse first, then
/// brace-balanced extraction as fallback.
fn parse_json_mode(body: &str) -> Result<Value, LlmError> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }
    let extracted = extract_balanced_json(body).ok_or(LlmError::JsonParseFailed)?;
    serde_json::from_str(extracted).map_err(|_| LlmError::JsonParseFailed)
}

/// Classification of a failed attempt, used to pick the retry/backoff rule.
#[derive(Debug, Clone, Copy)]
enum FailureKind {
    /// Reset, refused, DNS, or request-timeout — connection-level.
    Connection,
    ClientError(u16),
    ServerError(u16),
}

impl FailureKind {
    /// `None` means "do not retry".
    const fn backoff(self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Connection => Some(Duration::from_secs(3 * 2u64.pow(attempt))),
            Self::ServerError(_) => Some(Duration::from_secs(2u64.pow(attempt))),
            Self::ClientError(_) => None,
        }
    }

    fn into_error(self) -> LlmError {
        match self {
            Self::Connection => LlmError::Connection,
            Self::ClientError(status) => LlmError::UpstreamClient { status },
            Self::ServerError(status) => LlmError::UpstreamServer { status },
        }
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> FailureKind {
    if let Some(status) = err.status() {
        if status.is_client_error() {
            return FailureKind::ClientError(status.as_u16());
        }
        if status.is_server_error() {
            return FailureKind::ServerError(status.as_u16());
        }
    }
    // Connect/reset/DNS failures carry no status at all.
    FailureKind::Connection
}

/// Production [`LlmClient`] backed by a shared, pooled `reqwest::Client`.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

/// Endpoint and credential configuration for [`HttpLlmClient`].
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub chat_endpoint: String,
    pub embedding_endpoint: String,
    pub api_key: String,
    pub default_model: String,
}

impl HttpLlmClient {
    /// Builds a client with a keep-alive connection pool sized to at least
    /// 50 idle sockets, per the "persistent connections" requirement.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Connection`] if the underlying transport cannot
    /// be constructed (e.g. TLS backend initialization failure).
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(50)
            .build()
            .map_err(|_| LlmError::Connection)?;
        Ok(Self { http, config })
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, FailureKind> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FailureKind::Connection
                } else {
                    classify_reqwest_error(&e)
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(FailureKind::ClientError(status.as_u16()));
        }
        if status.is_server_error() {
            return Err(FailureKind::ServerError(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|_| FailureKind::ServerError(status.as_u16()))
    }

    async fn chat_once(&self, request: &ChatRequest, user: &str) -> Result<String, FailureKind> {
        let mut body = serde_json::json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": user},
            ],
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let value = self
            .post_json(&self.config.chat_endpoint, &body, request.timeout)
            .await?;

        Ok(value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn embed_once(
        &self,
        texts: &[String],
        text_type: TextType,
        timeout: Duration,
    ) -> Result<Vec<Vec<f32>>, FailureKind> {
        let body = serde_json::json!({
            "input": texts,
            "type": text_type.as_str(),
        });

        let value = self
            .post_json(&self.config.embedding_endpoint, &body, timeout)
            .await?;

        let data = value["data"].as_array().cloned().unwrap_or_default();
        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let vector: Vec<f32> = item["embedding"]
                .as_array()
                .map(|arr| arr.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
                .unwrap_or_default();
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutput, LlmError> {
        let user = truncate_chars(&request.user, request.max_content_chars);
        let mut attempt = 0u32;

        loop {
            match self.chat_once(&request, &user).await {
                Ok(text) => {
                    let json = if request.json_mode {
                        Some(parse_json_mode(&text)?)
                    } else {
                        None
                    };
                    return Ok(ChatOutput { text, json });
                }
                Err(kind) => {
                    if matches!(kind, FailureKind::ClientError(_)) || attempt >= request.max_retries {
                        return Err(kind.into_error());
                    }
                    if let Some(delay) = kind.backoff(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn embed(&self, text: &str, text_type: TextType) -> Result<Vec<f32>, LlmError> {
        let truncated = truncate_chars(text, EMBEDDING_CHAR_LIMIT);
        let mut attempt = 0u32;
        loop {
            match self
                .embed_once(std::slice::from_ref(&truncated), text_type, Duration::from_secs(30))
                .await
            {
                Ok(mut vectors) => return Ok(vectors.pop().unwrap_or_default()),
                Err(kind) => {
                    if matches!(kind, FailureKind::ClientError(_)) || attempt >= 2 {
                        return Err(kind.into_error());
                    }
                    if let Some(delay) = kind.backoff(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        text_type: TextType,
    ) -> Result<Vec<Option<Vec<f32>>>, LlmError> {
        let mut results = Vec::with_capacity(texts.len());

        for (group_index, group) in texts.chunks(EMBEDDING_BATCH_SIZE).enumerate() {
            if group_index > 0 {
                tokio::time::sleep(EMBEDDING_BATCH_PAUSE).await;
            }

            let truncated: Vec<String> =
                group.iter().map(|t| truncate_chars(t, EMBEDDING_CHAR_LIMIT)).collect();

            match self.embed_once(&truncated, text_type, Duration::from_secs(60)).await {
                Ok(vectors) => results.extend(vectors.into_iter().map(Some)),
                Err(_) => {
                    // Per-text fallback: failed items become `None`, not a
                    // batch-wide failure.
                    for text in &truncated {
                        match self
                            .embed_once(std::slice::from_ref(text), text_type, Duration::from_secs(30))
                            .await
                        {
                            Ok(mut v) => results.push(v.pop()),
                            Err(_) => results.push(None),
                        }
                    }
                }
            }
        }

        Ok(results)
    }
}
