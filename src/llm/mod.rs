//! LLM client (C3): chat completion and embedding requests with retries,
//! backoff, JSON-mode parsing, and connection pooling.

pub mod client;
pub mod prompts;
pub mod test_double;

pub use client::{ChatOutput, ChatRequest, HttpLlmClient, LlmClient, LlmConfig, TextType};
pub use prompts::AssistAction;
pub use test_double::ScriptedLlmClient;
