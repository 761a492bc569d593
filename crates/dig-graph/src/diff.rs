//! Structural diff between two versions of a document's graph

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use dig_core::{ConceptId, DocumentId, EdgeKey};

use crate::ConceptGraph;

/// Weights closer than this are considered unchanged
const WEIGHT_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptChange {
    pub id: ConceptId,
    pub label: String,
    pub salience_before: f32,
    pub salience_after: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeChange {
    pub key: EdgeKey,
    pub weight_before: f32,
    pub weight_after: f32,
}

/// Added, removed and reweighted nodes and edges from `from_version` to `to_version`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDiff {
    pub document_id: Option<DocumentId>,
    pub from_version: u64,
    pub to_version: u64,
    pub added_concepts: Vec<ConceptId>,
    pub removed_concepts: Vec<ConceptId>,
    pub reweighted_concepts: Vec<ConceptChange>,
    /// Same salience, different aliases or provenance
    pub updated_concepts: Vec<ConceptId>,
    pub added_edges: Vec<EdgeKey>,
    pub removed_edges: Vec<EdgeKey>,
    pub reweighted_edges: Vec<EdgeChange>,
}

impl GraphDiff {
    /// Compare two graphs; all lists come out sorted
    pub fn between(old: &ConceptGraph, new: &ConceptGraph) -> Self {
        let mut diff = GraphDiff {
            document_id: Some(new.document_id().clone()),
            from_version: old.version(),
            to_version: new.version(),
            ..Default::default()
        };

        for concept in new.concepts() {
            match old.concept(&concept.id) {
                None => diff.added_concepts.push(concept.id),
                Some(before) if (before.salience - concept.salience).abs() > WEIGHT_EPSILON => {
                    diff.reweighted_concepts.push(ConceptChange {
                        id: concept.id,
                        label: concept.label.clone(),
                        salience_before: before.salience,
                        salience_after: concept.salience,
                    })
                }
                Some(before) if before != concept => diff.updated_concepts.push(concept.id),
                Some(_) => {}
            }
        }
        diff.removed_concepts = old
            .concepts()
            .filter(|c| new.concept(&c.id).is_none())
            .map(|c| c.id)
            .collect();

        for rel in new.relationships() {
            let key = rel.key();
            match old.relationship(&key) {
                None => diff.added_edges.push(key),
                Some(before) if (before.weight - rel.weight).abs() > WEIGHT_EPSILON => {
                    diff.reweighted_edges.push(EdgeChange {
                        key,
                        weight_before: before.weight,
                        weight_after: rel.weight,
                    })
                }
                Some(_) => {}
            }
        }
        diff.removed_edges = old
            .relationships()
            .map(|r| r.key())
            .filter(|k| new.relationship(k).is_none())
            .collect();

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added_concepts.is_empty()
            && self.removed_concepts.is_empty()
            && self.reweighted_concepts.is_empty()
            && self.updated_concepts.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.reweighted_edges.is_empty()
    }

    /// Concepts whose node or incident edges changed; everything else is untouched work
    pub fn touched_concepts(&self) -> BTreeSet<ConceptId> {
        let mut touched: BTreeSet<ConceptId> = self
            .added_concepts
            .iter()
            .chain(&self.removed_concepts)
            .chain(&self.updated_concepts)
            .copied()
            .collect();
        touched.extend(self.reweighted_concepts.iter().map(|c| c.id));
        for key in self
            .added_edges
            .iter()
            .chain(&self.removed_edges)
            .chain(self.reweighted_edges.iter().map(|e| &e.key))
        {
            touched.insert(key.source);
            touched.insert(key.target);
        }
        touched
    }
}
