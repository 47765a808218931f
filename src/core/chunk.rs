//! Chunk representation produced by the structural chunker.
//!
//! A [`Chunk`] is a contiguous semantic segment of a contract: enough text to
//! reason about on its own, tagged with the structural segment types it
//! contains so the orchestrator can pick an analysis advisory for it.

use serde::{Deserialize, Serialize};

use crate::core::tokens::estimate_tokens;

/// Structural element a chunk's source lines were recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    /// A numbered article, section, or clause heading (第X条, `Article N`).
    Article,
    /// A numbered or lettered clause/sub-clause.
    Clause,
    /// A bracketed or all-caps section header.
    Header,
    /// A signature block line (party name, date, address).
    Signature,
    /// Ordinary body prose.
    Content,
}

/// Relative attention a downstream analyst should give a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Normal,
    Low,
}

impl Importance {
    /// Promotes `self` to `other` if `other` outranks it (High > Normal > Low).
    #[must_use]
    pub const fn promote(self, other: Self) -> Self {
        match (self, other) {
            (Self::High, _) | (_, Self::High) => Self::High,
            (Self::Normal, _) | (_, Self::Normal) => Self::Normal,
            (Self::Low, Self::Low) => Self::Low,
        }
    }
}

/// Marker prepended to a chunk whose head is the tail of the prior chunk.
pub const OVERLAP_MARKER: &str = "[上文续] ";

/// A semantically coherent fragment of a contract, sized to an LLM's
/// context budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text. Never empty.
    pub content: String,

    /// `estimate_tokens(content)`, cached at construction time.
    pub token_estimate: usize,

    /// Structural segment types detected within this chunk, in first-seen
    /// order, without duplicates.
    pub segments: Vec<SegmentType>,

    /// Attention level the orchestrator should give this chunk.
    pub importance: Importance,

    /// Whether this chunk begins with the overlap marker and a tail of the
    /// previous chunk.
    pub has_overlap: bool,

    /// 0-based, stable position in the emitted chunk sequence.
    pub chunk_index: usize,
}

impl Chunk {
    /// Builds a chunk, computing its token estimate from `content`.
    ///
    /// # Panics
    ///
    /// Panics if `content` is empty — chunk emission must never produce an
    /// empty chunk; catching this at construction keeps the invariant local.
    #[must_use]
    pub fn new(
        content: String,
        segments: Vec<SegmentType>,
        importance: Importance,
        has_overlap: bool,
        chunk_index: usize,
    ) -> Self {
        assert!(!content.is_empty(), "chunk content must not be empty");
        let token_estimate = estimate_tokens(&content);
        Self {
            content,
            token_estimate,
            segments,
            importance,
            has_overlap,
            chunk_index,
        }
    }

    /// Re-measures `token_estimate` from the current content.
    ///
    /// Used after the final-flush merge rule folds a residual chunk into its
    /// predecessor, which changes the content without going through `new`.
    pub fn retokenize(&mut self) {
        self.token_estimate = estimate_tokens(&self.content);
    }

    /// Returns `true` if `segments` contains the given type.
    #[must_use]
    pub fn has_segment(&self, segment: SegmentType) -> bool {
        self.segments.contains(&segment)
    }

    /// Folds a residual builder's content into this chunk (the final-flush
    /// merge rule), re-measuring the token estimate afterward.
    pub fn merge_residual(&mut self, residual: ChunkBuilder) {
        if residual.is_empty() {
            return;
        }
        self.content.push_str("\n\n");
        self.content.push_str(&residual.content);
        for segment in residual.segments {
            if !self.segments.contains(&segment) {
                self.segments.push(segment);
            }
        }
        self.importance = self.importance.promote(residual.importance);
        self.retokenize();
    }

    /// Returns the overlap tail (the text after [`OVERLAP_MARKER`] up to the
    /// first blank line), or `None` if this chunk has no overlap.
    #[must_use]
    pub fn overlap_tail(&self) -> Option<&str> {
        if !self.has_overlap {
            return None;
        }
        let after_marker = self.content.strip_prefix(OVERLAP_MARKER)?;
        let end = after_marker.find("\n\n").unwrap_or(after_marker.len());
        Some(&after_marker[..end])
    }
}

/// Fluent builder for [`Chunk`], mirroring the accumulator used while
/// packing segments during chunking.
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    content: String,
    segments: Vec<SegmentType>,
    importance: Importance,
    has_overlap: bool,
    chunk_index: usize,
}

impl Default for Importance {
    fn default() -> Self {
        Self::Normal
    }
}

impl ChunkBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` to the accumulator, separated from existing content by
    /// a blank line unless the accumulator is empty.
    #[must_use]
    pub fn append(mut self, text: &str) -> Self {
        if self.content.is_empty() {
            self.content.push_str(text);
        } else {
            self.content.push_str("\n\n");
            self.content.push_str(text);
        }
        self
    }

    /// Records a detected segment type, if not already present.
    #[must_use]
    pub fn with_segment(mut self, segment: SegmentType) -> Self {
        if !self.segments.contains(&segment) {
            self.segments.push(segment);
        }
        self
    }

    /// Promotes importance to at least `importance`.
    #[must_use]
    pub const fn promote_importance(mut self, importance: Importance) -> Self {
        self.importance = self.importance.promote(importance);
        self
    }

    #[must_use]
    pub const fn chunk_index(mut self, index: usize) -> Self {
        self.chunk_index = index;
        self
    }

    #[must_use]
    pub const fn has_overlap(mut self, has_overlap: bool) -> Self {
        self.has_overlap = has_overlap;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    #[must_use]
    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.content)
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn segments(&self) -> &[SegmentType] {
        &self.segments
    }

    #[must_use]
    pub const fn importance(&self) -> Importance {
        self.importance
    }

    /// Builds the chunk.
    ///
    /// # Panics
    ///
    /// Panics if no content was ever appended.
    #[must_use]
    pub fn build(self) -> Chunk {
        Chunk::new(
            self.content,
            self.segments,
            self.importance,
            self.has_overlap,
            self.chunk_index,
        )
    }
}
