//! Passage segmentation
//!
//! Packs paragraphs greedily into passages of at most `max_passage_chars`
//! characters. Oversized paragraphs fall back to sentence boundaries, and
//! oversized sentences to word boundaries, so a passage never ends inside a
//! word. Passages never span two source units.

use once_cell::sync::Lazy;
use regex::Regex;

use dig_core::{DocumentId, Passage, PassageId, SegmenterConfig, SourceLocation};

use crate::TextUnit;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid paragraph regex"));

static SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?。]+["')\]]*\s+|\n"#).expect("valid sentence regex"));

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("valid word regex"));

type Span = (usize, usize);

/// Splits text units into bounded passages
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segment units in order; passage ids run across the whole document
    pub fn segment(&self, document_id: &DocumentId, units: &[TextUnit]) -> Vec<Passage> {
        let mut passages = Vec::new();

        for unit in units {
            for (start, end) in self.pack_unit(&unit.text) {
                let text = &unit.text[start..end];
                let low_density = text.chars().count() < self.config.min_passage_chars;
                passages.push(Passage {
                    id: PassageId(passages.len() as u32),
                    document_id: document_id.clone(),
                    location: SourceLocation {
                        unit: unit.unit,
                        start,
                        end,
                    },
                    text: text.to_string(),
                    low_density,
                });
            }
        }

        tracing::debug!(
            document_id = %document_id,
            units = units.len(),
            passages = passages.len(),
            "Segmented document"
        );

        passages
    }

    /// Byte spans of the passages of one unit
    fn pack_unit(&self, text: &str) -> Vec<Span> {
        let mut packer = Packer::new(text, self.config.max_passage_chars.max(1));

        for paragraph in split_spans(text, &PARAGRAPH_BREAK) {
            if packer.try_extend(paragraph) {
                continue;
            }
            packer.flush();
            if packer.try_extend(paragraph) {
                continue;
            }

            for sentence in split_spans(&text[paragraph.0..paragraph.1], &SENTENCE_BREAK) {
                let sentence = (paragraph.0 + sentence.0, paragraph.0 + sentence.1);
                if packer.try_extend(sentence) {
                    continue;
                }
                packer.flush();
                if packer.try_extend(sentence) {
                    continue;
                }

                for word in WORD.find_iter(&text[sentence.0..sentence.1]) {
                    let word = (sentence.0 + word.start(), sentence.0 + word.end());
                    if packer.try_extend(word) {
                        continue;
                    }
                    packer.flush();
                    if !packer.try_extend(word) {
                        // A single word longer than the limit stands alone
                        packer.push(word);
                    }
                }
            }
        }

        packer.finish()
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

/// Greedy accumulator of contiguous spans
struct Packer<'a> {
    text: &'a str,
    max_chars: usize,
    current: Option<Span>,
    done: Vec<Span>,
}

impl<'a> Packer<'a> {
    fn new(text: &'a str, max_chars: usize) -> Self {
        Self {
            text,
            max_chars,
            current: None,
            done: Vec::new(),
        }
    }

    fn char_len(&self, span: Span) -> usize {
        self.text[span.0..span.1].chars().count()
    }

    /// Extend the current passage with `span` if the result still fits
    fn try_extend(&mut self, span: Span) -> bool {
        let candidate = match self.current {
            Some((start, _)) => (start, span.1),
            None => span,
        };
        if self.char_len(candidate) <= self.max_chars {
            self.current = Some(candidate);
            true
        } else {
            false
        }
    }

    fn push(&mut self, span: Span) {
        self.flush();
        self.done.push(span);
    }

    fn flush(&mut self) {
        if let Some(span) = self.current.take() {
            self.done.push(span);
        }
    }

    fn finish(mut self) -> Vec<Span> {
        self.flush();
        self.done
    }
}

/// Trimmed, non-empty spans of `text` between matches of `separator`
fn split_spans(text: &str, separator: &Regex) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    for m in separator.find_iter(text) {
        // Keep the terminal punctuation with its sentence
        let end = m.start() + m.as_str().trim_end().len();
        push_trimmed(text, cursor, end, &mut spans);
        cursor = m.end();
    }
    push_trimmed(text, cursor, text.len(), &mut spans);

    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<Span>) {
    if start >= end {
        return;
    }
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        let s = start + lead;
        spans.push((s, s + trimmed.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dig_core::SourceUnit;
    use proptest::prelude::*;

    fn segmenter(max: usize, min: usize) -> Segmenter {
        Segmenter::new(SegmenterConfig {
            max_passage_chars: max,
            min_passage_chars: min,
        })
    }

    fn page(text: &str) -> TextUnit {
        TextUnit::new(SourceUnit::Page(1), text)
    }

    #[test]
    fn test_short_unit_is_one_passage() {
        let passages = segmenter(1000, 20).segment(
            &DocumentId::new("doc"),
            &[page("First paragraph.\n\nSecond paragraph.")],
        );
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "First paragraph.\n\nSecond paragraph.");
        assert!(!passages[0].low_density);
    }

    #[test]
    fn test_paragraphs_flush_before_overflow() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta.";
        let passages = segmenter(25, 5).segment(&DocumentId::new("doc"), &[page(text)]);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].text, "Alpha beta gamma.");
        assert_eq!(passages[1].text, "Delta epsilon zeta.");
        assert_eq!(passages[1].location.start, text.find("Delta").unwrap());
    }

    #[test]
    fn test_long_paragraph_splits_at_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        let passages = segmenter(30, 5).segment(&DocumentId::new("doc"), &[page(text)]);
        let texts: Vec<_> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["One two three. Four five six.", "Seven eight nine."]);
    }

    #[test]
    fn test_long_sentence_splits_at_words() {
        let text = "supercalifragilistic expialidocious words here";
        let passages = segmenter(10, 1).segment(&DocumentId::new("doc"), &[page(text)]);
        assert_eq!(passages[0].text, "supercalifragilistic");
        assert!(passages.iter().all(|p| !p.text.contains(' ') || p.text.chars().count() <= 10));
    }

    #[test]
    fn test_units_are_never_merged_and_ids_are_global() {
        let units = [
            TextUnit::new(SourceUnit::Slide(1), "Backpropagation"),
            TextUnit::new(SourceUnit::Slide(2), "Chain rule applied layer by layer."),
        ];
        let passages = segmenter(1000, 20).segment(&DocumentId::new("deck"), &units);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].id, PassageId(0));
        assert_eq!(passages[1].id, PassageId(1));
        assert!(passages[0].low_density);
        assert_eq!(passages[1].location.unit, SourceUnit::Slide(2));
    }

    #[test]
    fn test_unicode_offsets_are_char_boundaries() {
        let text = "Équations différentielles. Théorème de Noether.";
        let passages = segmenter(28, 1).segment(&DocumentId::new("doc"), &[page(text)]);
        for p in &passages {
            assert_eq!(&text[p.location.start..p.location.end], p.text);
        }
    }

    proptest! {
        #[test]
        fn prop_segmentation_is_bounded_and_deterministic(
            words in proptest::collection::vec("[a-z]{1,12}[.]?", 0..120),
            breaks in proptest::collection::vec(0usize..4, 0..120),
            max in 10usize..200,
        ) {
            let mut text = String::new();
            for (i, w) in words.iter().enumerate() {
                if i > 0 {
                    text.push_str(match breaks.get(i).copied().unwrap_or(0) {
                        0 | 1 => " ",
                        2 => "\n",
                        _ => "\n\n",
                    });
                }
                text.push_str(w);
            }

            let seg = segmenter(max, 5);
            let doc = DocumentId::new("doc");
            let first = seg.segment(&doc, &[page(&text)]);
            let second = seg.segment(&doc, &[page(&text)]);
            prop_assert_eq!(&first, &second);

            for p in &first {
                prop_assert_eq!(&text[p.location.start..p.location.end], p.text.as_str());
                let single_word = !p.text.contains(char::is_whitespace);
                prop_assert!(single_word || p.text.chars().count() <= max);
                let before = text[..p.location.start].chars().next_back();
                let after = text[p.location.end..].chars().next();
                prop_assert!(before.map_or(true, char::is_whitespace));
                prop_assert!(after.map_or(true, char::is_whitespace));
            }
        }
    }
}
