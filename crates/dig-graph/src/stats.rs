//! Graph statistics

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use dig_core::{ConceptId, RelationType};

use crate::ConceptGraph;

/// Summary numbers for one graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub concept_count: usize,
    pub relationship_count: usize,
    /// Connected concept pairs over all possible pairs
    pub density: f32,
    pub average_degree: f32,
    pub connected_components: usize,
    pub relation_counts: BTreeMap<RelationType, usize>,
    /// Highest degree centrality, ties to the lowest id
    pub most_central: Option<ConceptId>,
    pub mean_salience: f32,
}

impl ConceptGraph {
    /// Build an undirected petgraph view, one node per concept
    fn undirected(&self) -> UnGraph<ConceptId, f32> {
        let mut graph = UnGraph::with_capacity(self.concept_count(), self.relationship_count());
        let index: HashMap<ConceptId, NodeIndex> = self
            .concepts()
            .map(|c| (c.id, graph.add_node(c.id)))
            .collect();
        for rel in self.relationships() {
            if let (Some(a), Some(b)) = (index.get(&rel.source), index.get(&rel.target)) {
                graph.update_edge(*a, *b, rel.weight);
            }
        }
        graph
    }

    pub fn stats(&self) -> GraphStats {
        let graph = self.undirected();
        let n = graph.node_count();
        let pairs = graph.edge_count();

        let mut relation_counts: BTreeMap<RelationType, usize> = BTreeMap::new();
        for rel in self.relationships() {
            *relation_counts.entry(rel.relation).or_default() += 1;
        }

        let most_central = graph
            .node_indices()
            .map(|i| (graph.neighbors(i).count(), graph[i]))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(_, id)| id);

        let possible = n * n.saturating_sub(1) / 2;
        GraphStats {
            concept_count: n,
            relationship_count: self.relationship_count(),
            density: if possible == 0 {
                0.0
            } else {
                pairs as f32 / possible as f32
            },
            average_degree: if n == 0 {
                0.0
            } else {
                2.0 * pairs as f32 / n as f32
            },
            connected_components: connected_components(&graph),
            relation_counts,
            most_central,
            mean_salience: if n == 0 {
                0.0
            } else {
                self.concepts().map(|c| c.salience).sum::<f32>() / n as f32
            },
        }
    }
}
