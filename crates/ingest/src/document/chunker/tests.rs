//! Tests for the page windower.

use super::helpers::{cap_chars, page_label};
use super::pages::chunk_document;
use super::types::{Chunk, ChunkConfig};
use crate::document::{ExtractedDocument, PageContent};

fn make_pdf_doc(pages: &[&str]) -> ExtractedDocument {
    ExtractedDocument {
        filename: "test.pdf".to_string(),
        file_type: "pdf".to_string(),
        pages: pages
            .iter()
            .enumerate()
            .map(|(i, text)| PageContent {
                page_number: i + 1,
                text: text.to_string(),
            })
            .collect(),
    }
}

fn config(pages_per_chunk: usize) -> ChunkConfig {
    ChunkConfig::new(pages_per_chunk, 20_000)
}

// ── Coverage ────────────────────────────────────────────────────────

#[test]
fn windows_cover_every_page_exactly_once() {
    for total in 0..=11 {
        let texts: Vec<String> = (1..=total).map(|i| format!("page {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let doc = make_pdf_doc(&refs);

        for per_chunk in 1..=4 {
            let chunks: Vec<Chunk> = chunk_document(&doc, &config(per_chunk)).collect();
            let covered: Vec<usize> = chunks.iter().flat_map(|c| c.pages()).collect();
            let expected: Vec<usize> = (1..=total).collect();
            assert_eq!(covered, expected, "total={total} per_chunk={per_chunk}");
            let summed: usize = chunks.iter().map(Chunk::page_count).sum();
            assert_eq!(summed, total);
        }
    }
}

#[test]
fn windows_are_ordered_and_indexed() {
    let doc = make_pdf_doc(&["a", "b", "c", "d", "e"]);
    let chunks: Vec<Chunk> = chunk_document(&doc, &config(2)).collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].label, "p1-2");
    assert_eq!(chunks[1].label, "p3-4");
    assert_eq!(chunks[2].label, "p5");
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.index, i);
    }
    assert_eq!(chunks[0].content, "a\n\nb");
}

#[test]
fn size_hint_is_exact() {
    let doc = make_pdf_doc(&["a", "b", "c", "d", "e"]);
    let mut iter = chunk_document(&doc, &config(2));
    assert_eq!(iter.size_hint(), (3, Some(3)));
    iter.next();
    assert_eq!(iter.size_hint(), (2, Some(2)));
}

#[test]
fn iterator_is_restartable() {
    let doc = make_pdf_doc(&["a", "b", "c"]);
    let mut iter = chunk_document(&doc, &config(1));
    iter.next();
    let saved = iter.clone();
    let rest: Vec<String> = iter.map(|c| c.label).collect();
    let replay: Vec<String> = saved.map(|c| c.label).collect();
    assert_eq!(rest, replay);
    assert_eq!(rest, vec!["p2", "p3"]);
}

// ── Blank pages ─────────────────────────────────────────────────────

#[test]
fn blank_page_window_is_flagged_and_skippable() {
    let doc = make_pdf_doc(&["Residuo A", "   \n", "Residuo B"]);
    let all: Vec<Chunk> = chunk_document(&doc, &config(1)).collect();
    assert_eq!(all.len(), 3);
    assert!(all[1].is_blank());

    let non_blank: Vec<Chunk> = chunk_document(&doc, &config(1)).filter(|c| !c.is_blank()).collect();
    assert_eq!(non_blank.len(), 2);
    assert_eq!(non_blank[0].label, "p1");
    assert_eq!(non_blank[1].label, "p3");
}

#[test]
fn blank_page_inside_window_is_skipped_in_text() {
    let doc = make_pdf_doc(&["uno", "", "tres"]);
    let chunks: Vec<Chunk> = chunk_document(&doc, &config(3)).collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "uno\n\ntres");
    assert_eq!(chunks[0].page_count(), 3);
    assert_eq!(chunks[0].blank_pages, 1);
    assert_eq!(chunks[0].content_pages(), 2);
}

#[test]
fn empty_document_produces_no_chunks() {
    let doc = make_pdf_doc(&[]);
    assert_eq!(chunk_document(&doc, &config(2)).count(), 0);
}

// ── Budget ──────────────────────────────────────────────────────────

#[test]
fn long_window_is_capped_on_char_boundary() {
    let doc = make_pdf_doc(&["ñandú ñandú ñandú"]);
    let cfg = ChunkConfig::new(1, 7);
    let chunks: Vec<Chunk> = chunk_document(&doc, &cfg).collect();
    assert!(chunks[0].capped);
    assert_eq!(chunks[0].content.chars().count(), 7);
    assert_eq!(chunks[0].content, "ñandú ñ");
}

#[test]
fn cap_chars_leaves_short_text() {
    let mut s = "abc".to_string();
    assert!(!cap_chars(&mut s, 3));
    assert_eq!(s, "abc");
}

#[test]
fn config_clamps_pages_per_chunk() {
    assert_eq!(ChunkConfig::new(0, 10).pages_per_chunk, 1);
    assert_eq!(ChunkConfig::new(9, 10).pages_per_chunk, 4);
    assert_eq!(ChunkConfig::default().pages_per_chunk, 2);
}

#[test]
fn literal_config_out_of_range_is_clamped_by_chunker() {
    let doc = make_pdf_doc(&["uno", "dos", "tres"]);
    let zero = ChunkConfig {
        pages_per_chunk: 0,
        max_chunk_chars: 0,
    };
    let chunks = chunk_document(&doc, &zero);
    assert_eq!(chunks.len(), 3);

    let chunks: Vec<Chunk> = chunks.collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].label, "p1");
    assert_eq!(chunks[0].content, "u");
    assert!(chunks[0].capped);
}

#[test]
fn labels() {
    assert_eq!(page_label(4, 4), "p4");
    assert_eq!(page_label(1, 3), "p1-3");
}
