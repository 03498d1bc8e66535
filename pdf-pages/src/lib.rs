//! Extract page-level text from PDF documents.
//!
//! This crate wraps the `pdf-extract` parser with a page-oriented API and a
//! small cleanup pass so downstream splitters see stable paragraph breaks.
//! Parser panics are contained and reported as ordinary errors, which lets
//! batch callers skip a broken upload and keep going.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use thiserror::Error;

mod clean;

pub use clean::clean_page_text;

/// Number of leading bytes searched for the `%PDF-` marker.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Text recovered from a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    /// Zero-based page index in document order.
    pub number: usize,
    /// Cleaned page text; empty when the page carries no extractable text.
    pub text: String,
}

/// Reasons a document could not be read.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No bytes were supplied.
    #[error("no PDF bytes supplied")]
    Empty,
    /// The bytes do not start with a PDF header.
    #[error("input is not a PDF document (missing %PDF- header)")]
    NotPdf,
    /// The parser rejected the document.
    #[error("malformed PDF: {0}")]
    Malformed(String),
    /// The parser panicked while decoding the document.
    #[error("PDF parser aborted: {0}")]
    Panicked(String),
}

/// Extracts the text of every page, in document order.
///
/// # Example
///
/// ```
/// use pdf_pages::{extract_pages, ExtractError};
///
/// assert!(matches!(extract_pages(b""), Err(ExtractError::Empty)));
/// assert!(matches!(extract_pages(b"plain text"), Err(ExtractError::NotPdf)));
/// ```
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::Empty);
    }
    if !has_pdf_header(bytes) {
        return Err(ExtractError::NotPdf);
    }

    let raw_pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|payload| ExtractError::Panicked(panic_message(payload.as_ref())))?
    .map_err(|err| ExtractError::Malformed(err.to_string()))?;

    Ok(raw_pages
        .into_iter()
        .enumerate()
        .map(|(number, raw)| PageText {
            number,
            text: clean_page_text(&raw),
        })
        .collect())
}

/// Extracts the whole document as one string, pages separated by blank lines.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = extract_pages(bytes)?;
    Ok(pages
        .into_iter()
        .map(|page| page.text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|candidate| candidate == b"%PDF-")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(extract_pages(&[]), Err(ExtractError::Empty)));
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = extract_pages(b"%PNG\r\n\x1a\n not a pdf").expect_err("png rejected");
        assert!(matches!(err, ExtractError::NotPdf));
    }

    #[test]
    fn header_may_follow_leading_garbage() {
        let mut bytes = vec![b' '; 16];
        bytes.extend_from_slice(b"%PDF-1.4\n");
        assert!(has_pdf_header(&bytes));
    }

    #[test]
    fn truncated_document_does_not_unwind() {
        let result = extract_pages(b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog");
        assert!(result.map(|pages| pages.is_empty()).unwrap_or(true));
    }
}
