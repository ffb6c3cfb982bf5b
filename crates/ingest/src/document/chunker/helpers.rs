//! Label and text-budget utilities used by the page windower.

use crate::document::PageContent;

/// `p3` for a single page, `p3-4` for a range.
pub(crate) fn page_label(first: usize, last: usize) -> String {
    if first == last {
        format!("p{first}")
    } else {
        format!("p{first}-{last}")
    }
}

/// Join the non-blank pages of a window, separated by blank lines.
pub(crate) fn join_pages(pages: &[PageContent]) -> String {
    pages
        .iter()
        .filter(|p| !p.is_blank())
        .map(|p| p.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut `text` to at most `max_chars` characters. Returns whether it was cut.
pub(crate) fn cap_chars(text: &mut String, max_chars: usize) -> bool {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            text.truncate(byte_idx);
            true
        }
        None => false,
    }
}
