//! Plain text and Markdown reader
//!
//! Pages are separated by form feed (`\x0c`). Each page is decoded as UTF-8
//! on its own so one bad page does not lose the rest of the document.

use dig_core::{DocumentFormat, SourceUnit};

use crate::{DocumentReader, ReaderOutput, Result};

const FORM_FEED: u8 = 0x0C;
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Plain text / Markdown reader
pub struct PlainTextReader;

impl PlainTextReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Split on form feed into pages, decoding each; shared with the PDF reader
pub(crate) fn read_pages(bytes: &[u8]) -> ReaderOutput {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut output = ReaderOutput::default();

    for (index, page) in bytes.split(|b| *b == FORM_FEED).enumerate() {
        let unit = SourceUnit::Page(index as u32 + 1);
        match std::str::from_utf8(page) {
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => output.push_unit(unit, text.replace("\r\n", "\n")),
            Err(e) => output.skip(unit, format!("invalid UTF-8: {e}")),
        }
    }

    output
}

impl DocumentReader for PlainTextReader {
    fn read(&self, bytes: &[u8]) -> Result<ReaderOutput> {
        Ok(read_pages(bytes))
    }

    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::PlainText, DocumentFormat::Markdown]
    }
}
