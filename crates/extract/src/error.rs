use thiserror::Error;

use cerebro_ingest::ExtractionError;

/// Fatal, whole-document failures. Everything else degrades per chunk.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
}

impl From<ExtractionError> for PipelineError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::UnsupportedType(t) => PipelineError::UnsupportedType(t),
            other => PipelineError::DocumentUnreadable(other.to_string()),
        }
    }
}

/// Why one attempt at a chunk failed. The last one is kept as the chunk's
/// diagnostic when it is abandoned.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChunkError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("blocked by content safety filter")]
    Blocked,
    #[error("unparseable response: {0}")]
    Unparseable(String),
    #[error("generation failed: {0}")]
    Generation(String),
}

impl ChunkError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ChunkError::RateLimited(_))
    }
}

/// A single record that could not be normalized; the rest of the chunk is kept.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordIssue {
    #[error("record {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("record {index} incomplete: missing {}", missing.join(", "))]
    Incomplete { index: usize, missing: Vec<&'static str> },
}
