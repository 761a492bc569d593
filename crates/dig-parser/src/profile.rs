//! Document profile
//!
//! Coarse, whole-document signals computed from extracted text: the
//! language, the kind of document, and a reading level from sentence length.
//! Indicator words are matched as whole word tokens, singular or plural.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TextUnit;

const ENGLISH_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
];
const ACADEMIC_WORDS: &[&str] = &[
    "abstract",
    "introduction",
    "methodology",
    "result",
    "conclusion",
    "reference",
];
const TEXTBOOK_WORDS: &[&str] = &["chapter", "exercise", "example", "definition", "theorem"];
const MANUAL_WORDS: &[&str] = &["step", "procedure", "instruction", "guide", "manual"];

/// Distinct English function words needed to call a text English
const ENGLISH_MIN: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Other,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    AcademicPaper,
    Textbook,
    Manual,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingLevel {
    Basic,
    Intermediate,
    Advanced,
    #[default]
    Unknown,
}

impl ReadingLevel {
    /// Level for an average sentence length in words
    pub fn from_average(words_per_sentence: f32) -> Self {
        if words_per_sentence > 25.0 {
            Self::Advanced
        } else if words_per_sentence > 15.0 {
            Self::Intermediate
        } else {
            Self::Basic
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AcademicPaper => "academic_paper",
            Self::Textbook => "textbook",
            Self::Manual => "manual",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// Whole-document signals of one extracted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentProfile {
    pub language: Language,
    pub document_type: DocumentType,
    pub reading_level: ReadingLevel,
    pub word_count: usize,
    pub sentence_count: usize,
}

impl DocumentProfile {
    pub fn from_units(units: &[TextUnit]) -> Self {
        let text: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        Self::from_text(&text.join("\n"))
    }

    pub fn from_text(text: &str) -> Self {
        let word_count = text.split_whitespace().count();
        let sentence_count = text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();
        if word_count == 0 {
            return Self::default();
        }

        let tokens: HashSet<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        let hits = |words: &[&str]| {
            words
                .iter()
                .filter(|w| tokens.contains(**w) || tokens.contains(&format!("{w}s")))
                .count()
        };

        let language = if hits(ENGLISH_WORDS) >= ENGLISH_MIN {
            Language::English
        } else {
            Language::Other
        };

        let document_type = if hits(ACADEMIC_WORDS) >= 3 {
            DocumentType::AcademicPaper
        } else if hits(TEXTBOOK_WORDS) >= 2 {
            DocumentType::Textbook
        } else if hits(MANUAL_WORDS) >= 2 {
            DocumentType::Manual
        } else {
            DocumentType::General
        };

        let reading_level = if sentence_count == 0 {
            ReadingLevel::Unknown
        } else {
            ReadingLevel::from_average(word_count as f32 / sentence_count as f32)
        };

        Self {
            language,
            document_type,
            reading_level,
            word_count,
            sentence_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_unknown() {
        let profile = DocumentProfile::from_text("  \n ");
        assert_eq!(profile.language, Language::Unknown);
        assert_eq!(profile.reading_level, ReadingLevel::Unknown);
        assert_eq!(profile.document_type, DocumentType::General);
        assert_eq!(profile.word_count, 0);
    }

    #[test]
    fn test_academic_paper() {
        let text = "Abstract. We study the effect of dropout on deep networks. \
                    Introduction. Prior work in this area is limited. \
                    Results show a gain. Conclusion. References follow.";
        let profile = DocumentProfile::from_text(text);
        assert_eq!(profile.language, Language::English);
        assert_eq!(profile.document_type, DocumentType::AcademicPaper);
        assert_eq!(profile.reading_level, ReadingLevel::Basic);
    }

    #[test]
    fn test_indicators_match_whole_words() {
        // "stepwise" and "guidelines" are not manual indicators
        let profile = DocumentProfile::from_text("A stepwise plan with guidelines.");
        assert_eq!(profile.document_type, DocumentType::General);

        let profile = DocumentProfile::from_text("Chapter 2 ends with exercises.");
        assert_eq!(profile.document_type, DocumentType::Textbook);

        let profile = DocumentProfile::from_text("Follow each step of the procedure.");
        assert_eq!(profile.document_type, DocumentType::Manual);
    }

    #[test]
    fn test_non_english_text() {
        let profile = DocumentProfile::from_text("Der Gradientenabstieg minimiert die Verlustfunktion.");
        assert_eq!(profile.language, Language::Other);
    }

    #[test]
    fn test_reading_level_from_sentence_length() {
        assert_eq!(ReadingLevel::from_average(10.0), ReadingLevel::Basic);
        assert_eq!(ReadingLevel::from_average(15.0), ReadingLevel::Basic);
        assert_eq!(ReadingLevel::from_average(20.0), ReadingLevel::Intermediate);
        assert_eq!(ReadingLevel::from_average(26.0), ReadingLevel::Advanced);

        let long = format!("{} end.", "word ".repeat(30));
        let profile = DocumentProfile::from_text(&long);
        assert_eq!(profile.reading_level, ReadingLevel::Advanced);
        assert_eq!(profile.sentence_count, 1);

        let no_stop = DocumentProfile::from_text("no sentence terminator here");
        assert_eq!(no_stop.reading_level, ReadingLevel::Unknown);
    }
}
