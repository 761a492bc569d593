//! In-memory catalog of the latest published graph per document
//!
//! Readers get an `Arc<ConceptGraph>` snapshot; publishing swaps the whole
//! value, so a reader never sees a graph that is still being built.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use dig_core::DocumentId;
use dig_graph::{ConceptGraph, GraphDiff};

#[derive(Debug, Clone, Default)]
pub struct GraphCatalog {
    graphs: Arc<RwLock<HashMap<DocumentId, Arc<ConceptGraph>>>>,
}

impl GraphCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest published graph for a document
    pub async fn get(&self, document_id: &DocumentId) -> Option<Arc<ConceptGraph>> {
        self.graphs.read().await.get(document_id).cloned()
    }

    /// Version the next build of `document_id` should start from
    pub async fn current_version(&self, document_id: &DocumentId) -> u64 {
        self.get(document_id).await.map_or(0, |g| g.version())
    }

    /// Replace the published graph, returning the diff against the previous one
    pub async fn publish(&self, graph: Arc<ConceptGraph>) -> Option<GraphDiff> {
        let mut graphs = self.graphs.write().await;
        let previous = graphs.insert(graph.document_id().clone(), Arc::clone(&graph));
        let diff = previous.map(|old| GraphDiff::between(&old, &graph));

        tracing::info!(
            document_id = %graph.document_id(),
            version = graph.version(),
            concepts = graph.concept_count(),
            relationships = graph.relationship_count(),
            changed = diff.as_ref().map_or(true, |d| !d.is_empty()),
            "Published concept graph"
        );
        diff
    }

    pub async fn remove(&self, document_id: &DocumentId) -> Option<Arc<ConceptGraph>> {
        self.graphs.write().await.remove(document_id)
    }

    pub async fn document_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.graphs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dig_graph::GraphBuilder;

    #[tokio::test]
    async fn test_publish_replaces_and_diffs() {
        let catalog = GraphCatalog::new();
        let doc = DocumentId::new("doc");
        assert_eq!(catalog.current_version(&doc).await, 0);

        let first = Arc::new(ConceptGraph::empty(doc.clone()));
        assert!(catalog.publish(Arc::clone(&first)).await.is_none());

        let mut builder = GraphBuilder::new(doc.clone()).with_base_version(first.version());
        builder.add_concept(dig_core::Concept::new("entropy")).unwrap();
        let second = Arc::new(builder.build().unwrap());
        let diff = catalog.publish(Arc::clone(&second)).await.unwrap();
        assert_eq!(diff.added_concepts.len(), 1);

        // Earlier snapshots stay intact
        assert!(first.is_empty());
        assert_eq!(catalog.get(&doc).await.unwrap().version(), 1);
        assert_eq!(catalog.document_ids().await, vec![doc.clone()]);
        assert!(catalog.remove(&doc).await.is_some());
        assert!(catalog.get(&doc).await.is_none());
    }
}
