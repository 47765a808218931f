//! # Contract Review Engine
//!
//! A map-reduce pipeline for automated legal contract risk review: structural
//! chunking of Chinese/English contract text, bounded-concurrency LLM
//! extraction per chunk, consolidation into a single risk report, and a
//! retrieval-grounded question-answering surface over the indexed clauses.
//!
//! ## Modules
//!
//! - [`core`]: token estimation, chunk/report domain types
//! - [`chunking`]: structural chunker (C2)
//! - [`llm`]: chat/embedding transport, prompts, test double (C3)
//! - [`orchestrator`]: map-reduce analysis pipeline (C4)
//! - [`storage`]: `SQLite`-backed persistence (C5)
//! - [`search`]: cosine-similarity retrieval and grounded Q&A (C5)
//! - [`web`]: HTTP surface
//! - [`config`]: environment-based configuration

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod chunking;
pub mod config;
pub mod core;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod search;
pub mod storage;
pub mod web;

pub use error::{Error, Result};

pub use core::{Chunk, ChunkBuilder, Importance, Report, Risk, SegmentType};

pub use storage::{DEFAULT_DB_PATH, SqliteStorage, Storage};

pub use chunking::{Chunker, ChunkerConfig, StructuralChunker};

pub use llm::{ChatOutput, ChatRequest, HttpLlmClient, LlmClient, LlmConfig, ScriptedLlmClient, TextType};

pub use search::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, MatchedChunk, RagAnswer, cosine_similarity};

pub use orchestrator::{AnalysisOrchestrator, AnalysisState, ProgressEvent};

pub use config::AppConfig;
