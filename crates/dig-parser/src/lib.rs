//! DIG Parser - Text extraction and passage segmentation
//!
//! Supports extracting plain-text units from:
//! - PDF documents (one unit per page)
//! - Plain text and Markdown (one unit per form-feed page)
//! - Microsoft Word (DOCX)
//! - PowerPoint (PPTX, one unit per slide)
//! - ZIP archives of the above (expanded one level)
//!
//! Each format reader implements the `DocumentReader` trait. The
//! `TextExtractor` dispatches on the declared format and the `Segmenter`
//! turns extracted units into bounded `Passage`s.

pub mod archive;
pub mod docx;
pub mod pdf;
pub mod pptx;
pub mod profile;
pub mod segment;
pub mod text;

pub use archive::ArchiveExpander;
pub use docx::DocxReader;
pub use pdf::PdfReader;
pub use pptx::PptxReader;
pub use profile::{DocumentProfile, DocumentType, Language, ReadingLevel};
pub use segment::Segmenter;
pub use text::PlainTextReader;

use dig_core::{Document, DocumentFormat, DocumentId, FormatKind, SourceUnit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during text extraction
#[derive(Error, Debug)]
pub enum ParserError {
    /// Format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the content
    #[error("IO error reading {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// DOCX parsing error
    #[error("DOCX parsing error: {0}")]
    DocxError(String),

    /// Slide deck parsing error
    #[error("Slide deck parsing error: {0}")]
    SlideDeckError(String),

    /// Archive could not be opened
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Content is corrupted or malformed
    #[error("File is corrupted or malformed: {0}")]
    CorruptedFile(String),

    /// Encoding error
    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Extraction Types
// ============================================================================

/// One ordered unit of plain text with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub unit: SourceUnit,
    pub text: String,
}

impl TextUnit {
    pub fn new(unit: SourceUnit, text: impl Into<String>) -> Self {
        Self {
            unit,
            text: text.into(),
        }
    }
}

/// A unit that could not be read and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUnit {
    pub unit: SourceUnit,
    pub reason: String,
}

/// What a format reader produces for one document
#[derive(Debug, Clone, Default)]
pub struct ReaderOutput {
    pub units: Vec<TextUnit>,
    pub skipped: Vec<SkippedUnit>,
}

impl ReaderOutput {
    pub fn push_unit(&mut self, unit: SourceUnit, text: impl Into<String>) {
        self.units.push(TextUnit::new(unit, text));
    }

    pub fn skip(&mut self, unit: SourceUnit, reason: impl Into<String>) {
        self.skipped.push(SkippedUnit {
            unit,
            reason: reason.into(),
        });
    }
}

/// A degraded-but-recoverable condition reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub document_id: DocumentId,
    /// Offending unit (`page 3`, `slide 2`, member path)
    pub unit: Option<String>,
    pub message: String,
}

/// Ordered text units extracted from one (non-archive) document
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub document_id: DocumentId,
    pub format: DocumentFormat,
    pub units: Vec<TextUnit>,
    pub warnings: Vec<ExtractionWarning>,
    pub profile: DocumentProfile,
}

impl ExtractedDocument {
    /// Total characters over all units
    pub fn char_count(&self) -> usize {
        self.units.iter().map(|u| u.text.chars().count()).sum()
    }
}

/// A member of an archive, extracted independently of its siblings
#[derive(Debug)]
pub struct MemberExtraction {
    pub document_id: DocumentId,
    /// Path of the member inside the archive
    pub path: String,
    pub format: Option<DocumentFormat>,
    pub result: Result<ExtractedDocument>,
}

/// Result of extracting one input document
#[derive(Debug)]
pub enum Extraction {
    Single(ExtractedDocument),
    Archive(Vec<MemberExtraction>),
}

// ============================================================================
// Reader Trait
// ============================================================================

/// Trait for format readers
pub trait DocumentReader: Send + Sync {
    /// Read raw bytes into ordered text units
    fn read(&self, bytes: &[u8]) -> Result<ReaderOutput>;

    /// Get supported formats
    fn supported_formats(&self) -> &[DocumentFormat];

    /// Check if this reader can handle a format
    fn can_read(&self, format: DocumentFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

// ============================================================================
// Text Extractor
// ============================================================================

/// Registry of format readers; the entry point of text extraction
pub struct TextExtractor {
    readers: Vec<Box<dyn DocumentReader>>,
}

impl TextExtractor {
    /// Create an extractor with no readers registered
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Create an extractor with every built-in reader registered
    pub fn new() -> Self {
        let mut extractor = Self::empty();
        extractor.register(PdfReader::new());
        extractor.register(PlainTextReader::new());
        extractor.register(DocxReader::new());
        extractor.register(PptxReader::new());
        extractor
    }

    /// Register a reader
    pub fn register<R: DocumentReader + 'static>(&mut self, reader: R) {
        self.readers.push(Box::new(reader));
    }

    /// Find a reader for a format
    pub fn find_reader(&self, format: DocumentFormat) -> Option<&dyn DocumentReader> {
        self.readers
            .iter()
            .find(|r| r.can_read(format))
            .map(|r| r.as_ref())
    }

    /// Extract a document, expanding archives one level
    pub fn extract(&self, document: &Document) -> Result<Extraction> {
        match document.format.kind() {
            Some(FormatKind::Archive) => {
                let members = ArchiveExpander::new(self).expand(&document.id, &document.content)?;
                Ok(Extraction::Archive(members))
            }
            Some(_) => self
                .extract_single(&document.id, document.format, &document.content)
                .map(Extraction::Single),
            None => Err(ParserError::UnsupportedFormat(document.format.to_string())),
        }
    }

    /// Extract a non-archive document
    pub fn extract_single(
        &self,
        document_id: &DocumentId,
        format: DocumentFormat,
        bytes: &[u8],
    ) -> Result<ExtractedDocument> {
        let reader = self
            .find_reader(format)
            .ok_or_else(|| ParserError::UnsupportedFormat(format.to_string()))?;

        let output = reader.read(bytes)?;

        if output.units.is_empty() && !output.skipped.is_empty() {
            return Err(ParserError::CorruptedFile(format!(
                "no readable units ({} skipped)",
                output.skipped.len()
            )));
        }

        let warnings = output
            .skipped
            .into_iter()
            .map(|skipped| {
                tracing::warn!(
                    document_id = %document_id,
                    unit = %skipped.unit,
                    reason = %skipped.reason,
                    "Skipping unreadable unit"
                );
                ExtractionWarning {
                    document_id: document_id.clone(),
                    unit: Some(skipped.unit.to_string()),
                    message: skipped.reason,
                }
            })
            .collect();

        let profile = DocumentProfile::from_units(&output.units);

        tracing::debug!(
            document_id = %document_id,
            format = %format,
            units = output.units.len(),
            document_type = %profile.document_type,
            "Extracted text units"
        );

        Ok(ExtractedDocument {
            document_id: document_id.clone(),
            format,
            units: output.units,
            warnings,
            profile,
        })
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
