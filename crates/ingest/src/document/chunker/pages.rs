//! Page-window strategy.

use tracing::debug;

use super::helpers::{cap_chars, join_pages, page_label};
use super::types::{Chunk, ChunkConfig};
use crate::document::ExtractedDocument;

/// Lazily window `doc` into chunks of `config.pages_per_chunk` pages.
///
/// Every page lands in exactly one chunk, in source order. Blank windows are
/// still yielded (see [`Chunk::is_blank`]) so callers can account for their
/// pages before skipping them. Out-of-range settings are clamped here as
/// well, since the config fields are public.
pub fn chunk_document<'a>(doc: &'a ExtractedDocument, config: &ChunkConfig) -> PageChunks<'a> {
    PageChunks {
        doc,
        config: ChunkConfig::new(config.pages_per_chunk, config.max_chunk_chars),
        next_page: 0,
        next_index: 0,
    }
}

/// Iterator over the page windows of one document.
#[derive(Debug, Clone)]
pub struct PageChunks<'a> {
    doc: &'a ExtractedDocument,
    config: ChunkConfig,
    next_page: usize,
    next_index: usize,
}

impl Iterator for PageChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let pages = &self.doc.pages;
        if self.next_page >= pages.len() {
            return None;
        }

        let end = (self.next_page + self.config.pages_per_chunk).min(pages.len());
        let window = &pages[self.next_page..end];
        let first_page = window[0].page_number;
        let last_page = window[window.len() - 1].page_number;
        let label = page_label(first_page, last_page);

        let mut content = join_pages(window);
        let capped = cap_chars(&mut content, self.config.max_chunk_chars);
        if capped {
            debug!(
                label = %label,
                max_chars = self.config.max_chunk_chars,
                "chunk text capped"
            );
        }

        let chunk = Chunk {
            index: self.next_index,
            label,
            first_page,
            last_page,
            blank_pages: window.iter().filter(|p| p.is_blank()).count(),
            content,
            capped,
        };

        self.next_page = end;
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.doc.pages.len().saturating_sub(self.next_page);
        let n = remaining.div_ceil(self.config.pages_per_chunk);
        (n, Some(n))
    }
}

impl ExactSizeIterator for PageChunks<'_> {}
