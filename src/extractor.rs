// src/extractor.rs

use thiserror::Error;
use tracing::debug;

/// Minimum extracted length (chars, after trimming) for a document to count
/// as readable.
pub const MIN_TEXT_CHARS: usize = 20;

/// Error types for text extraction. Parse failures and too-short output are
/// both reported as the same user-visible "unreadable" condition.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Text too short or unreadable")]
    Unreadable,
}

/// Converts document bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Rejects extracted text below the readability threshold.
pub fn ensure_readable(text: String) -> Result<String, ExtractError> {
    if text.trim().chars().count() < MIN_TEXT_CHARS {
        return Err(ExtractError::Unreadable);
    }
    Ok(text)
}

/// PDF text extraction over the pdf-extract parser.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            debug!(error = %e, "PDF parse failed");
            ExtractError::Unreadable
        })?;
        ensure_readable(text)
    }
}
