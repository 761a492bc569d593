//! Graph builder
//!
//! Accumulates concepts and relationships, merging repeated facts instead
//! of duplicating them, and counts every structural change into the
//! version. `build` re-checks the invariants before the graph is released.

use std::collections::{BTreeMap, HashMap};

use dig_core::text::normalize_term;
use dig_core::{Concept, ConceptId, DigError, DocumentId, EdgeKey, Relationship, Result};

use crate::ConceptGraph;

/// Sole writer of a `ConceptGraph`
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    document_id: DocumentId,
    version: u64,
    concepts: BTreeMap<ConceptId, Concept>,
    relationships: BTreeMap<EdgeKey, Relationship>,
}

impl GraphBuilder {
    /// Start an empty graph at version 0
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            version: 0,
            concepts: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Continue numbering from a previously published version
    pub fn with_base_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Start from a published graph; the graph itself is left untouched
    pub fn from_graph(graph: &ConceptGraph) -> Self {
        Self {
            document_id: graph.document_id.clone(),
            version: graph.version,
            concepts: graph.concepts.clone(),
            relationships: graph.relationships.clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn integrity(&self, reason: String) -> DigError {
        tracing::error!(
            document_id = %self.document_id,
            reason = %reason,
            "Graph integrity violation"
        );
        DigError::GraphIntegrity {
            document_id: self.document_id.clone(),
            reason,
        }
    }

    /// Add a concept, merging it into an existing node with the same id
    pub fn add_concept(&mut self, concept: Concept) -> Result<()> {
        if concept.id != ConceptId::from_label(&concept.label) {
            return Err(self.integrity(format!(
                "concept id {} does not match label '{}'",
                concept.id, concept.label
            )));
        }

        match self.concepts.get_mut(&concept.id) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge(&concept);
                if *existing != before {
                    self.version += 1;
                }
            }
            None => {
                self.concepts.insert(concept.id, concept);
                self.version += 1;
            }
        }
        Ok(())
    }

    /// Add a relationship; repeated evidence for the same key raises its weight
    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<()> {
        if relationship.is_self_loop() {
            return Err(self.integrity(format!(
                "self-loop on {} ({})",
                relationship.source, relationship.relation
            )));
        }
        for end in [&relationship.source, &relationship.target] {
            if !self.concepts.contains_key(end) {
                return Err(self.integrity(format!(
                    "{} edge references unknown concept {}",
                    relationship.relation, end
                )));
            }
        }

        let key = relationship.key();
        match self.relationships.get_mut(&key) {
            Some(existing) => {
                let before = existing.weight;
                existing.reinforce(&relationship);
                if existing.weight != before {
                    self.version += 1;
                }
            }
            None => {
                self.relationships.insert(key, relationship);
                self.version += 1;
            }
        }
        Ok(())
    }

    /// Remove a concept and every edge touching it
    pub fn remove_concept(&mut self, id: &ConceptId) -> Option<Concept> {
        let removed = self.concepts.remove(id)?;
        self.relationships.retain(|key, _| !key.touches(id));
        self.version += 1;
        Some(removed)
    }

    fn validate(&self) -> Result<()> {
        let mut owner: HashMap<String, ConceptId> = HashMap::new();
        for concept in self.concepts.values() {
            if !(0.0..=1.0).contains(&concept.salience) {
                return Err(self.integrity(format!(
                    "salience {} of '{}' outside [0, 1]",
                    concept.salience, concept.label
                )));
            }
            for alias in &concept.aliases {
                let key = normalize_term(alias);
                match owner.get(&key) {
                    Some(other) if *other != concept.id => {
                        return Err(self.integrity(format!(
                            "alias '{}' claimed by {} and {}",
                            alias, other, concept.id
                        )));
                    }
                    _ => {
                        owner.insert(key, concept.id);
                    }
                }
            }
        }

        for (key, rel) in &self.relationships {
            if rel.is_self_loop() {
                return Err(self.integrity(format!("self-loop on {}", rel.source)));
            }
            if !(0.0..=1.0).contains(&rel.weight) {
                return Err(self.integrity(format!(
                    "weight {} of {} edge outside [0, 1]",
                    rel.weight, key.relation
                )));
            }
            if *key != rel.key() {
                return Err(self.integrity(format!("edge stored under a stale key {:?}", key)));
            }
        }
        Ok(())
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<ConceptGraph> {
        self.validate()?;

        tracing::debug!(
            document_id = %self.document_id,
            version = self.version,
            concepts = self.concepts.len(),
            relationships = self.relationships.len(),
            "Graph built"
        );

        Ok(ConceptGraph {
            document_id: self.document_id,
            version: self.version,
            concepts: self.concepts,
            relationships: self.relationships,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{concept, edge};
    use dig_core::RelationType;
    use proptest::prelude::*;

    fn doc() -> DocumentId {
        DocumentId::new("doc")
    }

    #[test]
    fn test_version_counts_structural_changes() {
        let a = concept("entropy", 0.5);
        let b = concept("information gain", 0.5);
        let mut builder = GraphBuilder::new(doc()).with_base_version(3);
        builder.add_concept(a.clone()).unwrap();
        builder.add_concept(b.clone()).unwrap();
        builder
            .add_relationship(edge(&a, &b, RelationType::GenericAssociation, 0.2))
            .unwrap();
        assert_eq!(builder.version(), 6);
        assert_eq!(builder.build().unwrap().version(), 6);
    }

    #[test]
    fn test_repeated_evidence_increases_weight() {
        let a = concept("entropy", 0.5);
        let b = concept("information gain", 0.5);
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(a.clone()).unwrap();
        builder.add_concept(b.clone()).unwrap();
        builder
            .add_relationship(edge(&a, &b, RelationType::GenericAssociation, 0.2))
            .unwrap();
        builder
            .add_relationship(edge(&b, &a, RelationType::GenericAssociation, 0.2))
            .unwrap();
        let graph = builder.build().unwrap();
        assert_eq!(graph.relationship_count(), 1);
        let rel = graph.relationships().next().unwrap();
        assert!((rel.weight - 0.36).abs() < 1e-6);
        assert_eq!(rel.evidence, 2.0);
    }

    #[test]
    fn test_reinforce_without_reweight_keeps_version() {
        let a = concept("entropy", 0.5);
        let b = concept("information gain", 0.5);
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(a.clone()).unwrap();
        builder.add_concept(b.clone()).unwrap();
        builder
            .add_relationship(edge(&a, &b, RelationType::GenericAssociation, 0.2))
            .unwrap();
        let version = builder.version();

        builder
            .add_relationship(edge(&a, &b, RelationType::GenericAssociation, 0.0))
            .unwrap();
        assert_eq!(builder.version(), version);

        builder
            .add_relationship(edge(&a, &b, RelationType::GenericAssociation, 0.3))
            .unwrap();
        assert_eq!(builder.version(), version + 1);

        let mut saturated = GraphBuilder::new(doc());
        saturated.add_concept(a.clone()).unwrap();
        saturated.add_concept(b.clone()).unwrap();
        saturated
            .add_relationship(edge(&a, &b, RelationType::PartOf, 1.0))
            .unwrap();
        let version = saturated.version();
        saturated
            .add_relationship(edge(&a, &b, RelationType::PartOf, 0.5))
            .unwrap();
        assert_eq!(saturated.version(), version);
        assert_eq!(saturated.build().unwrap().relationships().next().unwrap().evidence, 2.0);
    }

    #[test]
    fn test_self_loop_rejected() {
        let a = concept("entropy", 0.5);
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(a.clone()).unwrap();
        let err = builder
            .add_relationship(edge(&a, &a, RelationType::CoOccurrence, 0.2))
            .unwrap_err();
        assert!(matches!(err, DigError::GraphIntegrity { .. }));
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let a = concept("entropy", 0.5);
        let b = concept("information gain", 0.5);
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(a.clone()).unwrap();
        assert!(builder
            .add_relationship(edge(&a, &b, RelationType::PartOf, 0.2))
            .is_err());
    }

    #[test]
    fn test_shared_alias_fails_build() {
        let a = concept("entropy", 0.5);
        let mut b = concept("information gain", 0.5);
        b.aliases.insert("Entropy".to_string());
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(a).unwrap();
        builder.add_concept(b).unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(err.document_id(), Some(&doc()));
    }

    #[test]
    fn test_same_concept_merges() {
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(concept("entropy", 0.3)).unwrap();
        builder.add_concept(concept("entropy", 0.4)).unwrap();
        let graph = builder.build().unwrap();
        assert_eq!(graph.concept_count(), 1);
        let c = graph.concepts().next().unwrap();
        assert_eq!(c.mention_count, 2);
        assert!((c.salience - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_from_graph_leaves_original_untouched() {
        let a = concept("entropy", 0.5);
        let b = concept("information gain", 0.5);
        let mut builder = GraphBuilder::new(doc());
        builder.add_concept(a.clone()).unwrap();
        let first = builder.build().unwrap();

        let mut next = GraphBuilder::from_graph(&first);
        next.add_concept(b).unwrap();
        next.remove_concept(&a.id);
        let second = next.build().unwrap();

        assert_eq!(first.concept_count(), 1);
        assert!(first.concept(&a.id).is_some());
        assert!(second.concept(&a.id).is_none());
        assert_eq!(second.version(), first.version() + 2);
    }

    proptest! {
        #[test]
        fn prop_edges_stay_unique_and_bounded(
            picks in proptest::collection::vec((0usize..4, 0usize..4, 0usize..4, 0.0f32..1.0), 0..40)
        ) {
            let labels = ["entropy", "information gain", "decision tree", "pruning"];
            let relations = [
                RelationType::CoOccurrence,
                RelationType::Prerequisite,
                RelationType::PartOf,
                RelationType::GenericAssociation,
            ];
            let concepts: Vec<Concept> = labels.iter().map(|l| concept(l, 0.5)).collect();
            let mut builder = GraphBuilder::new(doc());
            for c in &concepts {
                builder.add_concept(c.clone()).unwrap();
            }
            let mut last_weight: HashMap<EdgeKey, f32> = HashMap::new();
            for (a, b, r, w) in picks {
                let rel = edge(&concepts[a], &concepts[b], relations[r], w);
                let key = rel.key();
                let result = builder.add_relationship(rel);
                prop_assert_eq!(result.is_err(), a == b);
                if a != b {
                    let current = builder.relationships[&key].weight;
                    if let Some(prev) = last_weight.get(&key) {
                        prop_assert!(current >= *prev);
                    }
                    last_weight.insert(key, current);
                }
            }
            let graph = builder.build().unwrap();
            prop_assert_eq!(graph.relationship_count(), last_weight.len());
            for rel in graph.relationships() {
                prop_assert!(!rel.is_self_loop());
                prop_assert!((0.0..=1.0).contains(&rel.weight));
            }
        }
    }
}
