//! Document-level term statistics
//!
//! Built once, after every passage's candidates are known, and read-only
//! from then on.

use std::collections::{BTreeSet, HashMap};

use crate::PassageCandidates;

/// Document frequency per normalized term over the passages of a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermStatistics {
    passages: u32,
    document_frequency: HashMap<String, u32>,
}

impl TermStatistics {
    /// Aggregate the candidates of every passage of one document
    pub fn from_candidates<'a>(all: impl IntoIterator<Item = &'a PassageCandidates>) -> Self {
        let mut stats = Self::default();
        for passage in all {
            stats.passages += 1;
            let keys: BTreeSet<&str> = passage.candidates.iter().map(|c| c.key.as_str()).collect();
            for key in keys {
                *stats.document_frequency.entry(key.to_string()).or_default() += 1;
            }
        }
        stats
    }

    pub fn passage_count(&self) -> u32 {
        self.passages
    }

    pub fn document_frequency(&self, key: &str) -> u32 {
        self.document_frequency.get(key).copied().unwrap_or(0)
    }

    pub fn term_count(&self) -> usize {
        self.document_frequency.len()
    }

    /// Smoothed inverse document frequency, always >= 1
    pub fn specificity(&self, key: &str) -> f32 {
        let n = self.passages as f32;
        let df = self.document_frequency(key) as f32;
        ((n + 1.0) / (df + 1.0)).ln().max(0.0) + 1.0
    }
}
