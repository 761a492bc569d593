//! DIG Graph - Versioned concept graph
//!
//! `GraphBuilder` is the only writer: it validates the graph invariants and
//! hands back an immutable `ConceptGraph`. Everything else reads completed
//! graphs through the queries here, the layout export, structural diffs and
//! graph statistics.

pub mod builder;
pub mod diff;
pub mod layout;
pub mod stats;

pub use builder::GraphBuilder;
pub use diff::{ConceptChange, EdgeChange, GraphDiff};
pub use layout::{GraphLayout, LayoutEdge, LayoutMode, LayoutNode};
pub use stats::GraphStats;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dig_core::text::normalize_term;
use dig_core::{Concept, ConceptId, DocumentId, EdgeKey, RelationType, Relationship};

// ============================================================================
// Concept Graph
// ============================================================================

/// The concepts and relationships of one document at one version
///
/// Never mutated after `GraphBuilder::build` returns it; re-processing
/// produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptGraph {
    document_id: DocumentId,
    version: u64,
    concepts: BTreeMap<ConceptId, Concept>,
    relationships: BTreeMap<EdgeKey, Relationship>,
}

/// Which end of an edge the queried concept sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
    Undirected,
}

/// A directly connected concept, seen from the queried one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub concept_id: ConceptId,
    pub label: String,
    pub relation: RelationType,
    pub direction: EdgeDirection,
    pub weight: f32,
}

/// Salience descending, identifier ascending
pub(crate) fn by_salience(a: &Concept, b: &Concept) -> Ordering {
    b.salience.total_cmp(&a.salience).then(a.id.cmp(&b.id))
}

impl ConceptGraph {
    /// An empty graph, a legal result for a document with no concepts
    pub fn empty(document_id: DocumentId) -> Self {
        Self {
            document_id,
            version: 0,
            concepts: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn concept(&self, id: &ConceptId) -> Option<&Concept> {
        self.concepts.get(id)
    }

    /// Concepts in identifier order
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn relationship(&self, key: &EdgeKey) -> Option<&Relationship> {
        self.relationships.get(key)
    }

    /// Relationships in key order
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Look a concept up by label or any alias, ignoring case and diacritics
    pub fn find_concept(&self, label: &str) -> Option<&Concept> {
        let key = normalize_term(label);
        if key.is_empty() {
            return None;
        }
        self.concepts
            .get(&ConceptId::from_label(label))
            .or_else(|| {
                self.concepts
                    .values()
                    .find(|c| c.aliases.iter().any(|a| normalize_term(a) == key))
            })
    }

    /// Direct neighbors of a concept, strongest edge first
    pub fn neighbors(&self, id: &ConceptId) -> Vec<Neighbor> {
        let mut neighbors: Vec<Neighbor> = self
            .relationships
            .values()
            .filter(|r| r.key().touches(id))
            .filter_map(|r| {
                let (other, direction) = if r.source == *id {
                    (r.target, EdgeDirection::Outgoing)
                } else {
                    (r.source, EdgeDirection::Incoming)
                };
                let direction = if r.relation.is_directed() {
                    direction
                } else {
                    EdgeDirection::Undirected
                };
                self.concepts.get(&other).map(|c| Neighbor {
                    concept_id: other,
                    label: c.label.clone(),
                    relation: r.relation,
                    direction,
                    weight: r.weight,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.concept_id.cmp(&b.concept_id))
                .then(a.relation.cmp(&b.relation))
        });
        neighbors
    }

    /// Concepts in stable ordering-key order
    pub fn ordered(&self) -> Vec<&Concept> {
        let mut concepts: Vec<&Concept> = self.concepts.values().collect();
        concepts.sort_by(|a, b| by_salience(a, b));
        concepts
    }

    /// The `k` most salient concepts, for default graph framing
    pub fn top_k(&self, k: usize) -> Vec<&Concept> {
        let mut concepts = self.ordered();
        concepts.truncate(k);
        concepts
    }

    /// Number of distinct concepts adjacent to `id`, over any relation
    pub fn degree(&self, id: &ConceptId) -> usize {
        let mut others: Vec<ConceptId> = self
            .relationships
            .keys()
            .filter(|k| k.touches(id))
            .map(|k| if k.source == *id { k.target } else { k.source })
            .collect();
        others.sort();
        others.dedup();
        others.len()
    }

    /// Same concepts and relationships, whatever the version numbers
    pub fn structurally_eq(&self, other: &ConceptGraph) -> bool {
        self.document_id == other.document_id
            && self.concepts == other.concepts
            && self.relationships == other.relationships
    }
}

// ============================================================================
// Tests
// ============================================================================
