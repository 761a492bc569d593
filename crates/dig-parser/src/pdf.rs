//! PDF document reader using pdf-extract
//!
//! pdf-extract separates pages with form feed characters, so each page
//! becomes its own text unit.

use dig_core::DocumentFormat;

use crate::{text::read_pages, DocumentReader, ParserError, ReaderOutput, Result};

/// PDF document reader
pub struct PdfReader;

impl PdfReader {
    /// Create a new PDF reader
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentReader for PdfReader {
    fn read(&self, bytes: &[u8]) -> Result<ReaderOutput> {
        if !bytes.starts_with(b"%PDF") {
            return Err(ParserError::PdfError("missing %PDF header".to_string()));
        }

        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParserError::PdfError(e.to_string()))?;

        Ok(read_pages(text.as_bytes()))
    }

    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let reader = PdfReader::new();
        let err = reader.read(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ParserError::PdfError(_)));
    }

    #[test]
    fn test_supported_formats() {
        let reader = PdfReader::new();
        assert!(reader.can_read(DocumentFormat::Pdf));
        assert!(!reader.can_read(DocumentFormat::Docx));
    }
}
