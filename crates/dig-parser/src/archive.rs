//! ZIP archive expansion
//!
//! Archives are expanded one level. Every member is classified by its
//! extension and extracted independently, so a corrupt member only fails
//! itself. Nested archives are reported as unsupported members.

use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use dig_core::{DocumentFormat, DocumentId};

use crate::{MemberExtraction, ParserError, Result, TextExtractor};

/// Expands an archive into independently extracted members
pub struct ArchiveExpander<'a> {
    extractor: &'a TextExtractor,
}

impl<'a> ArchiveExpander<'a> {
    pub fn new(extractor: &'a TextExtractor) -> Self {
        Self { extractor }
    }

    /// Expand `bytes` into member extractions, in archive order
    pub fn expand(&self, archive_id: &DocumentId, bytes: &[u8]) -> Result<Vec<MemberExtraction>> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ParserError::ArchiveError(e.to_string()))?;

        let mut members = Vec::new();

        for index in 0..archive.len() {
            let mut file = match archive.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    let path = format!("#{index}");
                    members.push(MemberExtraction {
                        document_id: archive_id.member(&path),
                        path,
                        format: None,
                        result: Err(ParserError::ArchiveError(e.to_string())),
                    });
                    continue;
                }
            };

            if file.is_dir() {
                continue;
            }

            let path = file.name().to_string();
            if is_hidden(&path) {
                continue;
            }

            let document_id = archive_id.member(&path);
            let format = DocumentFormat::from_path(Path::new(&path));

            let result = if file.enclosed_name().is_none() {
                Err(ParserError::CorruptedFile(format!("unsafe member path: {path}")))
            } else {
                match format {
                    None => Err(ParserError::UnsupportedFormat(
                        Path::new(&path)
                            .extension()
                            .and_then(|e| e.to_str())
                            .unwrap_or("none")
                            .to_string(),
                    )),
                    Some(DocumentFormat::Zip) => Err(ParserError::UnsupportedFormat(
                        "nested archive".to_string(),
                    )),
                    Some(format) => {
                        let mut content = Vec::new();
                        match file.read_to_end(&mut content) {
                            Ok(_) => self
                                .extractor
                                .extract_single(&document_id, format, &content),
                            Err(e) => Err(ParserError::IoError { path: path.clone(), source: e }),
                        }
                    }
                }
            };

            if let Err(e) = &result {
                tracing::warn!(
                    archive_id = %archive_id,
                    member = %path,
                    error = %e,
                    "Archive member failed extraction"
                );
            }

            members.push(MemberExtraction {
                document_id,
                path,
                format,
                result,
            });
        }

        tracing::debug!(
            archive_id = %archive_id,
            members = members.len(),
            "Expanded archive"
        );

        Ok(members)
    }
}

/// OS metadata entries (`__MACOSX/`, dotfiles) are not documents
fn is_hidden(path: &str) -> bool {
    path.starts_with("__MACOSX/")
        || Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_members_fail_independently() {
        let bytes = build_zip(&[
            ("lectures/week1.txt", b"Linear algebra basics."),
            ("lectures/week2.pptx", b"not really a deck"),
            ("inner.zip", b"PK"),
            ("photo.png", b"\x89PNG"),
            ("__MACOSX/._week1.txt", b"junk"),
        ]);

        let extractor = TextExtractor::new();
        let members = ArchiveExpander::new(&extractor)
            .expand(&DocumentId::new("course"), &bytes)
            .unwrap();

        assert_eq!(members.len(), 4);
        assert_eq!(members[0].document_id.as_str(), "course/lectures/week1.txt");
        assert!(members[0].result.is_ok());
        assert!(matches!(
            members[1].result,
            Err(ParserError::SlideDeckError(_))
        ));
        assert!(matches!(
            members[2].result,
            Err(ParserError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            members[3].result,
            Err(ParserError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_corrupt_archive() {
        let extractor = TextExtractor::new();
        let err = ArchiveExpander::new(&extractor)
            .expand(&DocumentId::new("broken"), b"not a zip")
            .unwrap_err();
        assert!(matches!(err, ParserError::ArchiveError(_)));
    }

    #[test]
    fn test_hidden_entries() {
        assert!(is_hidden("__MACOSX/a.txt"));
        assert!(is_hidden("notes/.DS_Store"));
        assert!(!is_hidden("notes/a.txt"));
    }
}
