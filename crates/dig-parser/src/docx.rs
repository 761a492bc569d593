//! DOCX document reader using docx-rs
//!
//! Word documents have no reliable page boundaries, so the whole body is a
//! single unit. Each Word paragraph becomes a text paragraph, headings
//! included, and table rows are flattened to ` | `-separated lines.

use docx_rs::{
    read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild, TableCellContent, TableChild,
    TableRowChild,
};

use dig_core::{DocumentFormat, SourceUnit};

use crate::{DocumentReader, ParserError, ReaderOutput, Result};

/// DOCX document reader
pub struct DocxReader;

impl DocxReader {
    /// Create a new DOCX reader
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxReader {
    fn default() -> Self {
        Self::new()
    }
}

fn paragraph_text(para: &Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text.trim().to_string()
}

impl DocumentReader for DocxReader {
    fn read(&self, bytes: &[u8]) -> Result<ReaderOutput> {
        let docx = read_docx(bytes).map_err(|e| ParserError::DocxError(e.to_string()))?;

        let mut blocks: Vec<String> = Vec::new();

        for child in &docx.document.children {
            match child {
                DocumentChild::Paragraph(para) => {
                    let text = paragraph_text(para);
                    if !text.is_empty() {
                        blocks.push(text);
                    }
                }
                DocumentChild::Table(tbl) => {
                    let mut rows = Vec::new();
                    for row in &tbl.rows {
                        let TableChild::TableRow(tr) = row;
                        let cells: Vec<String> = tr
                            .cells
                            .iter()
                            .map(|cell| {
                                let TableRowChild::TableCell(tc) = cell;
                                tc.children
                                    .iter()
                                    .filter_map(|c| match c {
                                        TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                                        _ => None,
                                    })
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            })
                            .collect();
                        if cells.iter().any(|c| !c.is_empty()) {
                            rows.push(cells.join(" | "));
                        }
                    }
                    if !rows.is_empty() {
                        blocks.push(rows.join("\n"));
                    }
                }
                _ => {}
            }
        }

        let mut output = ReaderOutput::default();
        if !blocks.is_empty() {
            output.push_unit(SourceUnit::Page(1), blocks.join("\n\n"));
        }
        Ok(output)
    }

    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Docx]
    }
}
