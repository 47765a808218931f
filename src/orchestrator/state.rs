//! Analysis pipeline state machine and progress reporting.

use serde::Serialize;

/// Stage of the map-reduce analysis pipeline a document is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    Init,
    Chunking,
    Mapping,
    Reducing,
    /// The consolidation call failed or returned unusable JSON; the report
    /// was assembled from the per-chunk findings directly instead.
    ReducingDegraded,
    Indexing,
    Complete,
    Error,
}

impl AnalysisState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Chunking => "chunking",
            Self::Mapping => "mapping",
            Self::Reducing => "reducing",
            Self::ReducingDegraded => "reducing-degraded",
            Self::Indexing => "indexing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// A single progress update, suitable for streaming over SSE.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: String,
    /// 0.0 to 1.0.
    pub progress: f32,
    pub message: String,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(state: AnalysisState, progress: f32, message: impl Into<String>) -> Self {
        Self {
            stage: state.label().to_string(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }
}
