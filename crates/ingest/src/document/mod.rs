pub mod chunker;
mod pdf;
mod txt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    /// The document could not be parsed at all. Fatal for the whole run.
    #[error("Document unreadable: {0}")]
    DocumentUnreadable(String),
}

/// A page of extracted text.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// 1-based page number (for PDFs). For plain text, always 1.
    pub page_number: usize,
    /// The extracted text content. May be empty (scanned or blank page).
    pub text: String,
}

impl PageContent {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Result of extracting text from a document. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Original filename.
    pub filename: String,
    /// File type: "pdf", "txt"
    pub file_type: String,
    /// Every page in source order, including blank ones.
    pub pages: Vec<PageContent>,
}

impl ExtractedDocument {
    /// Build a document from already-extracted page texts, numbering from 1.
    pub fn from_pages<S: Into<String>>(filename: &str, pages: impl IntoIterator<Item = S>) -> Self {
        Self {
            filename: filename.to_string(),
            file_type: "txt".to_string(),
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| PageContent {
                    page_number: i + 1,
                    text: text.into(),
                })
                .collect(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Pages whose extracted text is empty or whitespace-only.
    pub fn blank_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.is_blank())
            .map(|p| p.page_number)
            .collect()
    }

    /// Total character count across all pages.
    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.len()).sum()
    }
}

/// Extract text from file bytes based on file type.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<ExtractedDocument, ExtractionError> {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    let file_type = ext.as_str();

    let pages = match file_type {
        "pdf" => pdf::extract_pdf(bytes)?,
        "txt" | "text" => txt::extract_txt(bytes)?,
        other => return Err(ExtractionError::UnsupportedType(other.to_string())),
    };

    tracing::debug!(filename, pages = pages.len(), "extracted document text");

    Ok(ExtractedDocument {
        filename: filename.to_string(),
        file_type: file_type.to_string(),
        pages,
    })
}
