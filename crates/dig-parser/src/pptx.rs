//! PPTX slide deck reader using zip + quick-xml
//!
//! Each `ppt/slides/slideN.xml` part becomes one unit, ordered by N. The
//! slide's first text paragraph (normally its title) is its first line.

use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use regex::Regex;
use zip::ZipArchive;

use dig_core::{DocumentFormat, SourceUnit};

use crate::{DocumentReader, ParserError, ReaderOutput, Result};

static SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid slide regex"));

/// PPTX reader
pub struct PptxReader;

impl PptxReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PptxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Slide parts in deck order
fn slide_parts<R: Read + std::io::Seek>(archive: &ZipArchive<R>) -> Vec<(u32, String)> {
    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let caps = SLIDE_PART.captures(name)?;
            let n = caps.get(1)?.as_str().parse().ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    parts.sort();
    parts
}

/// Text of one slide, one line per drawing paragraph (`a:p`)
///
/// Runs (`a:t`) are kept verbatim: a run boundary can fall inside a word,
/// and the spacing between words lives in the run text itself.
fn slide_text(xml: &str) -> std::result::Result<String, String> {
    let mut reader = XmlReader::from_str(xml);

    let mut buf = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"br" => line.push(' '),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                    line.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let content = t.unescape().map_err(|e| e.to_string())?;
                line.push_str(&content);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !line.trim().is_empty() {
        lines.push(line.trim().to_string());
    }
    let lines: Vec<String> = lines
        .iter()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    Ok(lines.join("\n"))
}

impl DocumentReader for PptxReader {
    fn read(&self, bytes: &[u8]) -> Result<ReaderOutput> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ParserError::SlideDeckError(format!("failed to open pptx: {e}")))?;

        let parts = slide_parts(&archive);
        if parts.is_empty() {
            return Err(ParserError::SlideDeckError(
                "no slide parts found".to_string(),
            ));
        }

        let mut output = ReaderOutput::default();
        for (n, name) in parts {
            let unit = SourceUnit::Slide(n);

            let mut xml = String::new();
            let read = archive
                .by_name(&name)
                .map_err(|e| e.to_string())
                .and_then(|mut file| file.read_to_string(&mut xml).map_err(|e| e.to_string()));
            if let Err(reason) = read {
                output.skip(unit, reason);
                continue;
            }

            match slide_text(&xml) {
                Ok(text) if text.is_empty() => {}
                Ok(text) => output.push_unit(unit, text),
                Err(reason) => output.skip(unit, reason),
            }
        }

        Ok(output)
    }

    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Pptx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn slide(title: &str, body: &str) -> String {
        format!(
            r#"<p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree>
<p:sp><p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:txBody><a:p><a:r><a:t>{body}</a:t></a:r><a:r><a:t> &amp; more</a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
        )
    }

    fn build_deck(parts: &[(&str, String)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_slides_ordered_numerically() {
        let deck = build_deck(&[
            ("ppt/slides/slide10.xml", slide("Ten", "last")),
            ("ppt/slides/slide2.xml", slide("Two", "middle")),
            ("ppt/slides/slide1.xml", slide("One", "first")),
            ("ppt/presentation.xml", "<p:presentation/>".to_string()),
        ]);

        let output = PptxReader::new().read(&deck).unwrap();
        let units: Vec<_> = output.units.iter().map(|u| u.unit).collect();
        assert_eq!(
            units,
            vec![SourceUnit::Slide(1), SourceUnit::Slide(2), SourceUnit::Slide(10)]
        );
        assert_eq!(output.units[0].text, "One\nfirst & more");
    }

    #[test]
    fn test_runs_keep_their_spacing() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:txBody>
<a:p><a:r><a:t>neural</a:t></a:r><a:r><a:t> network</a:t></a:r><a:r><a:t>s  are</a:t></a:r></a:p>
<a:p><a:r><a:t>gradient</a:t></a:r><a:br/><a:r><a:t>descent</a:t></a:r></a:p>
</p:txBody></p:sld>"#;
        assert_eq!(
            slide_text(xml).unwrap(),
            "neural networks are\ngradient descent"
        );
    }

    #[test]
    fn test_malformed_slide_is_skipped() {
        let deck = build_deck(&[
            ("ppt/slides/slide1.xml", slide("Intro", "fine")),
            (
                "ppt/slides/slide2.xml",
                "<p:sld><a:p><a:t>broken</a:t></a:q></p:sld>".to_string(),
            ),
        ]);

        let output = PptxReader::new().read(&deck).unwrap();
        assert_eq!(output.units.len(), 1);
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].unit, SourceUnit::Slide(2));
    }

    #[test]
    fn test_not_a_zip() {
        let err = PptxReader::new().read(b"not a zip at all").unwrap_err();
        assert!(matches!(err, ParserError::SlideDeckError(_)));
    }
}
