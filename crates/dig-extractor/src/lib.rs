//! DIG Extractor - Concept and relationship extraction
//!
//! Implements the three knowledge-extraction stages that sit between
//! passages and the graph:
//! - concept candidate detection and salience scoring (`concept`, `stats`)
//! - whole-document concept resolution (`resolver`)
//! - relationship inference from co-occurrence and lexical cues (`relation`)
//!
//! Detection runs per passage with no shared state; `TermStatistics` is the
//! barrier that turns per-passage candidates into document-level
//! specificity before scoring.

pub mod concept;
pub mod relation;
pub mod resolver;
pub mod stats;

pub use concept::ConceptExtractor;
pub use relation::RelationshipInferencer;
pub use resolver::{canonical_label, ConceptResolver, Occurrence, ResolvedConcepts, SurfaceForm};
pub use stats::TermStatistics;

use dig_core::{ExtractionConfig, PassageId};
use serde::{Deserialize, Serialize};

/// Why a candidate was picked up, which decides its positional weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Body,
    Emphasis,
    Definition,
    Heading,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Emphasis => "emphasis",
            Self::Definition => "definition",
            Self::Heading => "heading",
        }
    }

    /// Positional weight multiplier
    pub fn weight(&self, config: &ExtractionConfig) -> f32 {
        match self {
            Self::Body => 1.0,
            Self::Emphasis => config.emphasis_boost,
            Self::Definition => config.definition_boost,
            Self::Heading => config.heading_boost,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unscored concept candidate found in one passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub surface: String,
    /// Normalized comparison key
    pub key: String,
    /// Byte span within the passage text
    pub start: usize,
    pub end: usize,
    pub signal: Signal,
    pub word_count: usize,
}

/// Candidates of one passage; the output of the parallel detection phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageCandidates {
    pub passage_id: PassageId,
    pub low_density: bool,
    pub candidates: Vec<Candidate>,
}

impl PassageCandidates {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
