//! Concept candidate detection and salience scoring
//!
//! Detection looks at one passage at a time: runs of content words between
//! stopwords, verbs and punctuation become noun-phrase candidates, and each
//! candidate is tagged with the strongest positional signal that applies
//! (heading line, definition cue, emphasis). Scoring then combines the
//! document-level `TermStatistics` with per-passage repetition and position,
//! normalized to the passage maximum.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use dig_core::text::{is_acronym, is_stopword, normalize_term};
use dig_core::{ConceptKind, ExtractionConfig, Mention, Passage};

use crate::{Candidate, PassageCandidates, Signal, TermStatistics};

// ============================================================================
// Lexicons and patterns
// ============================================================================

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*").expect("valid token regex")
});

static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*|__([^_\n]+?)__").expect("valid emphasis regex"));

static DEFINITION_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\bdefinition|\bdefine[sd]?|\bthe concept of|\bkey concept|\bintroduction to|\boverview of)\s*:?\s*$",
    )
    .expect("valid definition regex")
});

static DEFINITION_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s+(?:is defined as|is called|is known as|refers to|denotes|means)\b")
        .expect("valid definition regex")
});

static NUMBERED_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)*\.?\s+\S|(?i:chapter|section|part|unit|lecture)\s+\d+)")
        .expect("valid heading regex")
});

/// Verbs and auxiliaries that end a noun phrase
static VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "use", "uses", "used", "using", "require", "requires", "required", "requiring", "need",
        "needs", "needed", "include", "includes", "included", "including", "contain", "contains",
        "contained", "consist", "consists", "comprise", "comprises", "belong", "belongs", "depend",
        "depends", "rely", "relies", "build", "builds", "built", "base", "based", "assume",
        "assumes", "train", "trains", "trained", "describe", "describes", "described", "explain",
        "explains", "explained", "show", "shows", "shown", "call", "called", "know", "known",
        "define", "defined", "refer", "refers", "mean", "means", "provide", "provides", "provided",
        "allow", "allows", "make", "makes", "made", "give", "gives", "given", "take", "takes",
        "taken", "become", "becomes", "get", "gets", "got", "see", "seen", "find", "found",
        "apply", "applies", "applied", "lead", "leads", "produce", "produces", "denote", "denotes",
        "compute", "computes", "computed", "minimize", "minimizes", "maximize", "maximizes",
    ]
    .into_iter()
    .collect()
});

/// Nouns that carry relationship cues ("is a type of", "prior to")
static RELATION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "type", "types", "kind", "kinds", "form", "forms", "part", "parts", "example", "examples",
        "instance", "instances", "subset", "prerequisite", "prerequisites", "foundation", "prior",
    ]
    .into_iter()
    .collect()
});

/// Academic scaffolding words that are never concepts on their own
static GENERIC: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "page", "figure", "fig", "table", "chapter", "section", "exercise", "problem", "solution",
        "answer", "question", "note", "notes", "remark", "comment", "introduction", "summary",
        "conclusion", "overview", "abstract", "references", "bibliography", "appendix", "lecture",
        "slide", "slides", "unit", "topic", "way", "thing", "things", "lot", "case", "cases",
        "result", "results", "http", "https", "www", "com", "org", "definition", "theorem",
        "lemma", "proof", "concept", "concepts",
    ]
    .into_iter()
    .collect()
});

fn has_long_digit_run(word: &str) -> bool {
    let mut run = 0;
    for c in word.chars() {
        run = if c.is_ascii_digit() { run + 1 } else { 0 };
        if run >= 4 {
            return true;
        }
    }
    false
}

fn is_content_word(lower: &str) -> bool {
    let len = lower.chars().count();
    len >= 2
        && lower.chars().any(char::is_alphabetic)
        && !is_stopword(lower)
        && !VERBS.contains(lower)
        && !RELATION_WORDS.contains(lower)
        && !(len > 4 && lower.ends_with("ly"))
        && !has_long_digit_run(lower)
}

fn is_generic(lower: &str) -> bool {
    GENERIC.contains(lower)
}

// ============================================================================
// Heading heuristics
// ============================================================================

/// Check if a line reads like a heading or title
pub fn is_heading_line(line: &str) -> bool {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return false;
    }

    if trimmed.starts_with('#') || NUMBERED_HEADING.is_match(trimmed) {
        return true;
    }

    // All caps (common in headers)
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase()) {
        return true;
    }

    // Short title-case line without terminal punctuation
    if trimmed.ends_with(['.', '!', '?', ',', ';']) {
        return false;
    }
    let words: Vec<&str> = TOKEN.find_iter(trimmed).map(|m| m.as_str()).collect();
    let content: Vec<&&str> = words
        .iter()
        .filter(|w| is_content_word(&w.to_lowercase()))
        .collect();
    words.len() <= 10
        && !content.is_empty()
        && content
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase))
}

/// Kind of a candidate: label words first, then how the text presents it
fn kind_of(surface: &str, signal: Signal) -> ConceptKind {
    if let Some(kind) = ConceptKind::from_label(surface) {
        return kind;
    }
    match signal {
        Signal::Definition => ConceptKind::Defined,
        Signal::Heading => ConceptKind::Topic,
        _ if is_acronym(surface) => ConceptKind::Acronym,
        _ => ConceptKind::General,
    }
}

// ============================================================================
// Concept Extractor
// ============================================================================

#[derive(Debug, Clone)]
struct Token {
    start: usize,
    end: usize,
    content: bool,
}

/// Rule-based concept extractor
#[derive(Debug, Clone)]
pub struct ConceptExtractor {
    config: ExtractionConfig,
}

impl ConceptExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Find unscored candidates in one passage; depends on nothing else
    pub fn detect(&self, passage: &Passage) -> PassageCandidates {
        let text = passage.text.as_str();
        let max_words = self.config.max_phrase_words.max(1);

        let tokens: Vec<Token> = TOKEN
            .find_iter(text)
            .map(|m| Token {
                start: m.start(),
                end: m.end(),
                content: is_content_word(&m.as_str().to_lowercase()),
            })
            .collect();

        // Runs of content words separated only by spaces or tabs
        let mut runs: Vec<Vec<&Token>> = Vec::new();
        let mut current: Vec<&Token> = Vec::new();
        for token in &tokens {
            let joined = current.last().is_some_and(|prev| {
                text[prev.end..token.start]
                    .chars()
                    .all(|c| c == ' ' || c == '\t')
            });
            if !(token.content && joined) && !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            if token.content {
                current.push(token);
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }

        let emphasis: Vec<(usize, usize)> = EMPHASIS
            .captures_iter(text)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| (m.start(), m.end()))
            .collect();

        let slide_title = passage.location.unit.is_slide() && passage.location.start == 0;

        let mut raw: Vec<Candidate> = Vec::new();
        for run in runs {
            for chunk in run.chunks(max_words) {
                let (start, end) = (chunk[0].start, chunk[chunk.len() - 1].end);
                let surface = &text[start..end];
                let key = normalize_term(surface);
                if key.is_empty() || key.split(' ').all(is_generic) {
                    continue;
                }
                raw.push(Candidate {
                    surface: surface.to_string(),
                    key,
                    start,
                    end,
                    signal: self.signal_at(text, start, end, &emphasis, slide_title),
                    word_count: chunk.len(),
                });
            }
        }

        // Single words need a reason to count as concepts
        let mut single_counts: HashMap<&str, usize> = HashMap::new();
        for c in raw.iter().filter(|c| c.word_count == 1) {
            *single_counts.entry(c.key.as_str()).or_default() += 1;
        }
        let keep: Vec<bool> = raw
            .iter()
            .map(|c| {
                c.word_count > 1
                    || c.signal != Signal::Body
                    || is_acronym(&c.surface)
                    || single_counts.get(c.key.as_str()).copied().unwrap_or(0) >= 2
            })
            .collect();

        let candidates: Vec<Candidate> = raw
            .into_iter()
            .zip(keep)
            .filter_map(|(c, keep)| keep.then_some(c))
            .collect();

        tracing::trace!(
            passage_id = %passage.id,
            candidates = candidates.len(),
            "Detected candidates"
        );

        PassageCandidates {
            passage_id: passage.id,
            low_density: passage.low_density,
            candidates,
        }
    }

    /// Strongest positional signal for a span
    fn signal_at(
        &self,
        text: &str,
        start: usize,
        end: usize,
        emphasis: &[(usize, usize)],
        slide_title: bool,
    ) -> Signal {
        let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);

        let mut signals = vec![Signal::Body];
        if (slide_title && line_start == 0) || is_heading_line(&text[line_start..line_end]) {
            signals.push(Signal::Heading);
        }
        if DEFINITION_BEFORE.is_match(&text[line_start..start])
            || DEFINITION_AFTER.is_match(&text[end..line_end])
        {
            signals.push(Signal::Definition);
        }
        if emphasis.iter().any(|(s, e)| *s <= start && end <= *e) {
            signals.push(Signal::Emphasis);
        }

        signals
            .into_iter()
            .max_by(|a, b| {
                a.weight(&self.config)
                    .total_cmp(&b.weight(&self.config))
                    .then(a.cmp(b))
            })
            .unwrap_or(Signal::Body)
    }

    /// Score one passage's candidates against document statistics
    pub fn score(&self, passage: &PassageCandidates, stats: &TermStatistics) -> Vec<Mention> {
        struct Term {
            count: u32,
            weight: f32,
            words: usize,
        }

        let mut terms: BTreeMap<&str, Term> = BTreeMap::new();
        for c in &passage.candidates {
            let term = terms.entry(c.key.as_str()).or_insert(Term {
                count: 0,
                weight: 0.0,
                words: c.word_count,
            });
            term.count += 1;
            term.weight = term.weight.max(c.signal.weight(&self.config));
            term.words = term.words.max(c.word_count);
        }

        let raw: BTreeMap<&str, f32> = terms
            .iter()
            .map(|(key, t)| {
                let phrase = if t.words > 1 { 1.2 } else { 1.0 };
                let score = stats.specificity(key)
                    * t.weight
                    * (1.0 + (t.count as f32).ln())
                    * phrase;
                (*key, score)
            })
            .collect();

        let max_raw = raw.values().copied().fold(0.0f32, f32::max);
        if max_raw <= 0.0 {
            return Vec::new();
        }

        let mut ranked: Vec<(&str, f32)> = raw
            .into_iter()
            .map(|(key, score)| {
                let mut salience = (score / max_raw).clamp(0.0, 1.0);
                if passage.low_density {
                    salience = salience.min(self.config.low_density_cap);
                }
                (key, salience)
            })
            .filter(|(_, s)| *s >= self.config.min_salience)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));

        let mut mentions = Vec::new();
        'terms: for (key, salience) in ranked {
            for c in passage.candidates.iter().filter(|c| c.key == key) {
                if mentions.len() >= self.config.max_mentions_per_passage {
                    break 'terms;
                }
                mentions.push(Mention {
                    surface: c.surface.clone(),
                    passage_id: passage.passage_id,
                    start: c.start,
                    end: c.end,
                    salience,
                    kind: kind_of(&c.surface, c.signal),
                });
            }
        }

        mentions.sort_by_key(|m| m.start);
        mentions
    }

    /// Detect, aggregate and score all passages sequentially
    pub fn extract(&self, passages: &[Passage]) -> Vec<Mention> {
        let candidates: Vec<PassageCandidates> = passages.iter().map(|p| self.detect(p)).collect();
        let stats = TermStatistics::from_candidates(&candidates);
        candidates
            .iter()
            .flat_map(|c| self.score(c, &stats))
            .collect()
    }
}

impl Default for ConceptExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dig_core::{DocumentId, PassageId, SourceLocation, SourceUnit};

    fn passage(id: u32, text: &str) -> Passage {
        passage_in(SourceUnit::Page(1), id, text, false)
    }

    fn passage_in(unit: SourceUnit, id: u32, text: &str, low_density: bool) -> Passage {
        Passage {
            id: PassageId(id),
            document_id: DocumentId::new("doc"),
            location: SourceLocation {
                unit,
                start: 0,
                end: text.len(),
            },
            text: text.to_string(),
            low_density,
        }
    }

    fn keys(candidates: &PassageCandidates) -> Vec<&str> {
        candidates.candidates.iter().map(|c| c.key.as_str()).collect()
    }

    #[test]
    fn test_noun_phrases_between_function_words() {
        let extractor = ConceptExtractor::default();
        let p = passage(
            0,
            "A neural network is powerful. Any neural network is trainable.\n\n\
             Each neural network is trained with gradient descent.",
        );
        let found = extractor.detect(&p);
        assert_eq!(
            keys(&found),
            vec!["neural network", "neural network", "neural network", "gradient descent"]
        );
        let first = &found.candidates[0];
        assert_eq!(&p.text[first.start..first.end], "neural network");
    }

    #[test]
    fn test_single_words_need_a_signal() {
        let extractor = ConceptExtractor::default();
        let p = passage(
            0,
            "Entropy. Entropy is useful; the CNN is popular, apples are not.",
        );
        let found = extractor.detect(&p);
        let keys = keys(&found);
        assert_eq!(keys.iter().filter(|k| **k == "entropy").count(), 2);
        assert!(keys.contains(&"cnn"));
        assert!(!keys.contains(&"apples"));
        assert!(!keys.contains(&"useful"));
    }

    #[test]
    fn test_generic_words_are_rejected() {
        let extractor = ConceptExtractor::default();
        let p = passage(0, "See Figure 3 and Table 2. The figure shows the table.");
        assert!(extractor.detect(&p).is_empty());
    }

    #[test]
    fn test_heading_and_emphasis_signals() {
        let extractor = ConceptExtractor::default();
        let p = passage(
            0,
            "Backpropagation\nThe **chain rule** is applied to compute gradients layer by layer.",
        );
        let found = extractor.detect(&p);
        let by_key: HashMap<&str, Signal> = found
            .candidates
            .iter()
            .map(|c| (c.key.as_str(), c.signal))
            .collect();
        assert_eq!(by_key.get("backpropagation"), Some(&Signal::Heading));
        assert_eq!(by_key.get("chain rule"), Some(&Signal::Emphasis));
    }

    #[test]
    fn test_definition_cue() {
        let extractor = ConceptExtractor::default();
        let p = passage(0, "In short, overfitting refers to memorizing noise in training data.");
        let found = extractor.detect(&p);
        let c = found
            .candidates
            .iter()
            .find(|c| c.key == "overfitting")
            .unwrap();
        assert_eq!(c.signal, Signal::Definition);
    }

    #[test]
    fn test_slide_title_is_heading() {
        let extractor = ConceptExtractor::default();
        let p = passage_in(
            SourceUnit::Slide(1),
            0,
            "regularization\nweight decay keeps parameters small",
            false,
        );
        let found = extractor.detect(&p);
        assert_eq!(found.candidates[0].key, "regularization");
        assert_eq!(found.candidates[0].signal, Signal::Heading);
    }

    #[test]
    fn test_mention_kinds() {
        let extractor = ConceptExtractor::default();
        let passages = vec![passage(
            0,
            "Backpropagation\nOverfitting refers to memorizing noise. The CNN uses gradient descent.",
        )];
        let kinds: HashMap<String, ConceptKind> = extractor
            .extract(&passages)
            .into_iter()
            .map(|m| (normalize_term(&m.surface), m.kind))
            .collect();
        assert_eq!(kinds.get("backpropagation"), Some(&ConceptKind::Topic));
        assert_eq!(kinds.get("overfitting"), Some(&ConceptKind::Defined));
        assert_eq!(kinds.get("cnn"), Some(&ConceptKind::Acronym));
        assert_eq!(kinds.get("gradient descent"), Some(&ConceptKind::Method));
    }

    #[test]
    fn test_heading_heuristics() {
        assert!(is_heading_line("1. Introduction"));
        assert!(is_heading_line("CHAPTER ONE"));
        assert!(is_heading_line("Gradient Descent Methods"));
        assert!(is_heading_line("## Loss functions"));
        assert!(!is_heading_line("This is a normal paragraph."));
        assert!(!is_heading_line(""));
    }

    #[test]
    fn test_scores_are_normalized_per_passage() {
        let extractor = ConceptExtractor::default();
        let passages = vec![
            passage(0, "Neural network layers. Neural network weights. Gradient descent."),
            passage(1, "Gradient descent converges slowly."),
        ];
        let mentions = extractor.extract(&passages);
        assert!(mentions.iter().all(|m| (0.0..=1.0).contains(&m.salience)));
        let top = mentions
            .iter()
            .filter(|m| m.passage_id == PassageId(0))
            .map(|m| m.salience)
            .fold(0.0f32, f32::max);
        assert_eq!(top, 1.0);
    }

    #[test]
    fn test_low_density_salience_is_capped() {
        let extractor = ConceptExtractor::default();
        let p = passage_in(SourceUnit::Slide(1), 0, "Markov Chains", true);
        let candidates = extractor.detect(&p);
        let stats = TermStatistics::from_candidates([&candidates]);
        let mentions = extractor.score(&candidates, &stats);
        assert_eq!(mentions.len(), 1);
        assert!(mentions[0].salience <= extractor.config().low_density_cap);
    }

    #[test]
    fn test_mention_cap() {
        let config = ExtractionConfig {
            max_mentions_per_passage: 2,
            ..Default::default()
        };
        let extractor = ConceptExtractor::new(config);
        let p = passage(
            0,
            "Linear algebra, matrix calculus, convex optimization, probability theory.",
        );
        let candidates = extractor.detect(&p);
        let stats = TermStatistics::from_candidates([&candidates]);
        assert_eq!(extractor.score(&candidates, &stats).len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn prop_mentions_are_bounded(text in "[a-zA-Z*_.,:\n é]{0,200}") {
            let extractor = ConceptExtractor::default();
            let passages = vec![passage(0, &text)];
            for m in extractor.extract(&passages) {
                proptest::prop_assert!((0.0..=1.0).contains(&m.salience));
                proptest::prop_assert!(m.start < m.end && m.end <= text.len());
                proptest::prop_assert!(text.is_char_boundary(m.start) && text.is_char_boundary(m.end));
            }
        }
    }
}
