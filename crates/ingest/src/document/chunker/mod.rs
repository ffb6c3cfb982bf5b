//! Page-window chunking.
//!
//! Splits an extracted document into ordered, non-overlapping windows of
//! whole pages sized for a single generation call. Windows are produced
//! lazily and the iterator is `Clone`, so a run can be restarted from any
//! saved position.

mod helpers;
mod pages;
mod types;

pub use pages::{chunk_document, PageChunks};
pub use types::{Chunk, ChunkConfig};

#[cfg(test)]
mod tests;
