pub mod document;

pub use document::chunker::{chunk_document, Chunk, ChunkConfig, PageChunks};
pub use document::{extract_text, ExtractedDocument, ExtractionError, PageContent};
