//! Chunk configuration and output types.

use cerebro_core::config::{PipelineConfig, MAX_PAGES_PER_CHUNK, MIN_PAGES_PER_CHUNK};

// ── Configuration ───────────────────────────────────────────────────────────

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Pages per chunk (1..=4, default 2).
    pub pages_per_chunk: usize,
    /// Character budget per chunk; longer text is cut on a char boundary.
    pub max_chunk_chars: usize,
}

impl ChunkConfig {
    pub fn new(pages_per_chunk: usize, max_chunk_chars: usize) -> Self {
        Self {
            pages_per_chunk: pages_per_chunk.clamp(MIN_PAGES_PER_CHUNK, MAX_PAGES_PER_CHUNK),
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(2, 20_000)
    }
}

impl From<&PipelineConfig> for ChunkConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.pages_per_chunk, cfg.max_chunk_chars)
    }
}

// ── Chunk output ────────────────────────────────────────────────────────────

/// A contiguous run of pages sent to the model as one unit.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based index within the document.
    pub index: usize,
    /// Diagnostic label, `p3` or `p3-4`.
    pub label: String,
    /// First and last page numbers covered (inclusive, 1-based).
    pub first_page: usize,
    pub last_page: usize,
    /// Pages in the window with no extractable text.
    pub blank_pages: usize,
    /// Concatenated page text.
    pub content: String,
    /// True when `content` was cut to the character budget.
    pub capped: bool,
}

impl Chunk {
    pub fn page_count(&self) -> usize {
        self.last_page - self.first_page + 1
    }

    /// Pages that actually carry text.
    pub fn content_pages(&self) -> usize {
        self.page_count().saturating_sub(self.blank_pages)
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<usize> {
        self.first_page..=self.last_page
    }

    /// Nothing to analyze: every page in the window was blank.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}
