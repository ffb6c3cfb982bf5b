use super::{ExtractionError, PageContent};

/// Extract per-page text from PDF bytes.
///
/// pdf-extract returns all text as one string with form feeds (`\x0C`)
/// between pages. Blank pages are kept so page accounting stays exact.
pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<PageContent>, ExtractionError> {
    // pdf-extract can panic on malformed cross-reference tables.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractionError::DocumentUnreadable("PDF parser panicked".to_string()))?;
    let text = extracted.map_err(|e| ExtractionError::DocumentUnreadable(e.to_string()))?;

    Ok(split_pages(&text))
}

fn split_pages(text: &str) -> Vec<PageContent> {
    let mut parts: Vec<&str> = text.split('\x0C').collect();
    // A trailing form feed closes the last page rather than opening a new one.
    if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }

    parts
        .into_iter()
        .enumerate()
        .map(|(i, page_text)| PageContent {
            page_number: i + 1,
            text: page_text.trim().to_string(),
        })
        .collect()
}
