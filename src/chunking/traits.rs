//! Chunker trait and its configuration record.

use crate::core::Chunk;
use crate::error::Result;

/// Tunable limits for structural chunking, overridable per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Upper bound on a chunk's token estimate.
    pub max_chunk_tokens: usize,
    /// Target size of the overlap tail carried into the next chunk.
    pub overlap_tokens: usize,
    /// Minimum token estimate for a final residual chunk to stand alone.
    pub min_chunk_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 6_000,
            overlap_tokens: 300,
            min_chunk_tokens: 800,
        }
    }
}

impl ChunkerConfig {
    #[must_use]
    pub const fn new(max_chunk_tokens: usize, overlap_tokens: usize, min_chunk_tokens: usize) -> Self {
        Self {
            max_chunk_tokens,
            overlap_tokens,
            min_chunk_tokens,
        }
    }
}

/// Splits contract text into semantically coherent, token-bounded chunks.
///
/// Implementations must be deterministic: identical input and configuration
/// always produce an identical chunk sequence.
pub trait Chunker: Send + Sync {
    /// Chunks `text` using this chunker's configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid (e.g.
    /// `min_chunk_tokens` exceeding `max_chunk_tokens`).
    fn chunk(&self, text: &str) -> Result<Vec<Chunk>>;

    /// Name of the chunking strategy.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ChunkerConfig::default();
        assert_eq!(config.max_chunk_tokens, 6_000);
        assert_eq!(config.overlap_tokens, 300);
        assert_eq!(config.min_chunk_tokens, 800);
    }

    #[test]
    fn test_custom_config() {
        let config = ChunkerConfig::new(1000, 50, 100);
        assert_eq!(config.max_chunk_tokens, 1000);
        assert_eq!(config.overlap_tokens, 50);
        assert_eq!(config.min_chunk_tokens, 100);
    }
}
