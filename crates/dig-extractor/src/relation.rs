//! Relationship inference
//!
//! Every pair of concepts that shares a passage gets one undirected
//! `GenericAssociation` edge. Pairs that only meet across neighbouring
//! passages get a `CoOccurrence` edge with distance-discounted evidence.
//! Typed `Prerequisite` / `PartOf` edges come from lexical cues between two
//! consecutive mentions in the same sentence; they sit alongside the
//! association edge, never replace it.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use dig_core::{
    evidence_factor, ConceptId, EdgeKey, InferenceConfig, Passage, PassageId, RelationType,
    Relationship,
};

use crate::ResolvedConcepts;

// ============================================================================
// Cue patterns
// ============================================================================

/// Which way a cue points between the first and the second mention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CueDirection {
    /// Edge runs from the first mention to the second
    FirstToSecond,
    /// Edge runs from the second mention to the first
    SecondToFirst,
}

/// A family of cue phrases for one relationship type
#[derive(Debug)]
struct RelationPattern {
    relation: RelationType,
    regex: Regex,
    direction: CueDirection,
}

impl RelationPattern {
    fn new(relation: RelationType, pattern: &str, direction: CueDirection) -> Self {
        Self {
            relation,
            regex: Regex::new(pattern).expect("valid cue regex"),
            direction,
        }
    }
}

/// Cue families, reverse forms before forward ones
static PATTERNS: Lazy<Vec<RelationPattern>> = Lazy::new(|| {
    vec![
        // "A is a prerequisite for B": A before B
        RelationPattern::new(
            RelationType::Prerequisite,
            r"(?i)\b(?:is\s+(?:a\s+)?prerequisite\s+(?:for|of|to)|(?:is|are)\s+(?:needed|required)\s+(?:for|by|before)|(?:is\s+)?(?:the\s+)?foundation\s+(?:of|for)|comes?\s+before|prior\s+to|before)\b",
            CueDirection::FirstToSecond,
        ),
        // "A requires B": B before A
        RelationPattern::new(
            RelationType::Prerequisite,
            r"(?i)\b(?:requires?|needs?|depends?\s+on|builds?\s+(?:up)?on|(?:is\s+)?based\s+on|relies\s+on|assumes?)\b",
            CueDirection::SecondToFirst,
        ),
        // "A includes B": B is part of A
        RelationPattern::new(
            RelationType::PartOf,
            r"(?i)\b(?:includes?|including|contains?|consists?\s+of|comprises?|such\s+as)\b",
            CueDirection::SecondToFirst,
        ),
        // "A is a type of B": A is part of B
        RelationPattern::new(
            RelationType::PartOf,
            r"(?i)\b(?:(?:is|are)\s+(?:a|an|one)?\s*(?:type|kind|form|part|component|example|subset|instance|member)s?\s+of|belongs?\s+to)\b",
            CueDirection::FirstToSecond,
        ),
    ]
});

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?;\n]").expect("valid sentence regex"));

// ============================================================================
// Relationship Inferencer
// ============================================================================

#[derive(Debug, Default)]
struct Evidence {
    shared: f32,
    window: f32,
    passages: BTreeSet<PassageId>,
}

/// Rule-based relationship inferencer
#[derive(Debug, Clone)]
pub struct RelationshipInferencer {
    config: InferenceConfig,
}

impl RelationshipInferencer {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Classify the text between two mentions, if it carries a cue
    fn classify_gap(&self, gap: &str) -> Option<(RelationType, CueDirection)> {
        if gap.len() > self.config.max_cue_gap_chars || SENTENCE_END.is_match(gap) {
            return None;
        }
        PATTERNS
            .iter()
            .find(|p| p.regex.is_match(gap))
            .map(|p| (p.relation, p.direction))
    }

    /// Infer relationships over resolved concepts and their passages
    pub fn infer(&self, resolved: &ResolvedConcepts, passages: &[Passage]) -> Vec<Relationship> {
        let by_passage = resolved.by_passage();
        let text_of: BTreeMap<PassageId, &str> =
            passages.iter().map(|p| (p.id, p.text.as_str())).collect();

        let concepts_in: BTreeMap<PassageId, BTreeSet<ConceptId>> = by_passage
            .iter()
            .map(|(pid, occs)| (*pid, occs.iter().map(|(id, _)| *id).collect()))
            .collect();

        // Co-occurrence evidence, keyed by the undirected pair
        let mut pairs: BTreeMap<(ConceptId, ConceptId), Evidence> = BTreeMap::new();

        for (pid, ids) in &concepts_in {
            let ids: Vec<&ConceptId> = ids.iter().collect();
            for (i, a) in ids.iter().enumerate() {
                for b in &ids[i + 1..] {
                    let e = pairs.entry(((**a).min(**b), (**a).max(**b))).or_default();
                    e.shared += 1.0;
                    e.passages.insert(*pid);
                }
            }
        }

        let window = self.config.cooccurrence_window;
        for (pid, ids_p) in concepts_in.iter().filter(|_| window > 0) {
            let (lower, upper) = (pid.0.saturating_add(1), pid.0.saturating_add(window));
            if lower > upper {
                continue;
            }
            for (qid, ids_q) in concepts_in.range(PassageId(lower)..=PassageId(upper)) {
                let distance = (qid.0 - pid.0) as f32;
                let mut seen: BTreeSet<(ConceptId, ConceptId)> = BTreeSet::new();
                for a in ids_p {
                    for b in ids_q {
                        if a == b {
                            continue;
                        }
                        let key = ((*a).min(*b), (*a).max(*b));
                        if !seen.insert(key) {
                            continue;
                        }
                        let e = pairs.entry(key).or_default();
                        e.window += 1.0 / (1.0 + distance);
                        e.passages.insert(*pid);
                        e.passages.insert(*qid);
                    }
                }
            }
        }

        let salience = |id: &ConceptId| resolved.get(id).map_or(0.0, |c| c.salience);
        let mut edges: BTreeMap<EdgeKey, Relationship> = BTreeMap::new();

        for ((a, b), e) in pairs {
            let evidence = e.shared + e.window;
            let relation = if e.shared > 0.0 {
                RelationType::GenericAssociation
            } else {
                RelationType::CoOccurrence
            };
            let weight =
                evidence_factor(evidence, self.config.evidence_smoothing) * salience(&a) * salience(&b);
            let edge = Relationship::new(a, b, relation, weight, evidence, e.passages);
            edges.insert(edge.key(), edge);
        }

        // Typed edges from cues between consecutive mentions
        let mut typed: BTreeMap<EdgeKey, (f32, BTreeSet<PassageId>)> = BTreeMap::new();
        for (pid, occs) in &by_passage {
            let Some(text) = text_of.get(pid) else {
                continue;
            };
            for pair in occs.windows(2) {
                let ((first_id, first), (second_id, second)) = (pair[0], pair[1]);
                if first_id == second_id || first.end > second.start || second.start > text.len() {
                    continue;
                }
                let Some(gap) = text.get(first.end..second.start) else {
                    continue;
                };
                if let Some((relation, direction)) = self.classify_gap(gap) {
                    let (source, target) = match direction {
                        CueDirection::FirstToSecond => (first_id, second_id),
                        CueDirection::SecondToFirst => (second_id, first_id),
                    };
                    let entry = typed
                        .entry(EdgeKey::new(source, target, relation))
                        .or_default();
                    entry.0 += 1.0;
                    entry.1.insert(*pid);
                }
            }
        }

        for (key, (hits, passages)) in typed {
            let weight = evidence_factor(hits, self.config.evidence_smoothing)
                * salience(&key.source)
                * salience(&key.target);
            let edge = Relationship::new(key.source, key.target, key.relation, weight, hits, passages);
            edges.insert(key, edge);
        }

        tracing::debug!(
            concepts = resolved.len(),
            relationships = edges.len(),
            "Inferred relationships"
        );

        edges.into_values().collect()
    }
}

impl Default for RelationshipInferencer {
    fn default() -> Self {
        Self::new(InferenceConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
