//! Layout-ready export for the visualization layer
//!
//! Nodes carry a stable ordering key (salience descending, identifier
//! ascending) plus degree and degree centrality measured on the whole graph.
//! Coordinates are left to the renderer.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use dig_core::{ConceptId, DocumentId, PassageId, RelationType};

use crate::ConceptGraph;

/// Which part of the graph to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LayoutMode {
    /// Every concept and relationship
    Full,
    /// The `top_k` most salient concepts and the edges among them
    Focus { top_k: usize },
    /// Concepts within `depth` hops of `center`
    Neighborhood { center: ConceptId, depth: usize },
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Focus { .. } => "focus",
            Self::Neighborhood { .. } => "neighborhood",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: ConceptId,
    pub label: String,
    /// Position in the stable ordering, starting at 0
    pub order: usize,
    pub salience: f32,
    pub degree: usize,
    /// Degree divided by the largest possible degree
    pub centrality: f32,
    pub aliases: Vec<String>,
    pub passages: Vec<PassageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub source: ConceptId,
    pub target: ConceptId,
    pub relation: RelationType,
    pub directed: bool,
    pub weight: f32,
}

/// Nodes and edges of one layout view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLayout {
    pub document_id: DocumentId,
    pub version: u64,
    pub mode: LayoutMode,
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

impl ConceptGraph {
    fn neighborhood(&self, center: &ConceptId, depth: usize) -> BTreeSet<ConceptId> {
        let mut seen = BTreeSet::new();
        if self.concept(center).is_none() {
            return seen;
        }
        seen.insert(*center);
        let mut queue = VecDeque::from([(*center, 0usize)]);
        while let Some((id, hops)) = queue.pop_front() {
            if hops == depth {
                continue;
            }
            for neighbor in self.neighbors(&id) {
                if seen.insert(neighbor.concept_id) {
                    queue.push_back((neighbor.concept_id, hops + 1));
                }
            }
        }
        seen
    }

    /// Export a deterministic, layout-ready view of the graph
    ///
    /// A neighborhood around an unknown concept is an empty view.
    pub fn layout(&self, mode: LayoutMode) -> GraphLayout {
        let ordered = self.ordered();
        let selected: BTreeSet<ConceptId> = match mode {
            LayoutMode::Full => ordered.iter().map(|c| c.id).collect(),
            LayoutMode::Focus { top_k } => ordered.iter().take(top_k).map(|c| c.id).collect(),
            LayoutMode::Neighborhood { center, depth } => self.neighborhood(&center, depth),
        };

        let max_degree = self.concept_count().saturating_sub(1).max(1) as f32;
        let nodes: Vec<LayoutNode> = ordered
            .into_iter()
            .filter(|c| selected.contains(&c.id))
            .enumerate()
            .map(|(order, c)| {
                let degree = self.degree(&c.id);
                LayoutNode {
                    id: c.id,
                    label: c.label.clone(),
                    order,
                    salience: c.salience,
                    degree,
                    centrality: degree as f32 / max_degree,
                    aliases: c.aliases.iter().cloned().collect(),
                    passages: c.passages.iter().copied().collect(),
                }
            })
            .collect();

        let edges: Vec<LayoutEdge> = self
            .relationships()
            .filter(|r| selected.contains(&r.source) && selected.contains(&r.target))
            .map(|r| LayoutEdge {
                source: r.source,
                target: r.target,
                relation: r.relation,
                directed: r.relation.is_directed(),
                weight: r.weight,
            })
            .collect();

        GraphLayout {
            document_id: self.document_id().clone(),
            version: self.version(),
            mode,
            nodes,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{concept, edge};
    use crate::GraphBuilder;

    fn chain() -> ConceptGraph {
        // a - b - c - d, salience descending along the chain
        let labels = [("algebra", 0.9), ("calculus", 0.7), ("statistics", 0.5), ("inference", 0.3)];
        let concepts: Vec<_> = labels.iter().map(|(l, s)| concept(l, *s)).collect();
        let mut builder = GraphBuilder::new(DocumentId::new("doc"));
        for c in &concepts {
            builder.add_concept(c.clone()).unwrap();
        }
        for pair in concepts.windows(2) {
            builder
                .add_relationship(edge(&pair[0], &pair[1], RelationType::GenericAssociation, 0.5))
                .unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_full_layout_is_ordered_and_deterministic() {
        let graph = chain();
        let first = graph.layout(LayoutMode::Full);
        assert_eq!(first, graph.layout(LayoutMode::Full));
        assert_eq!(first.nodes.len(), 4);
        assert_eq!(first.edges.len(), 3);
        let labels: Vec<&str> = first.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["algebra", "calculus", "statistics", "inference"]);
        assert!(first.nodes.iter().enumerate().all(|(i, n)| n.order == i));
    }

    #[test]
    fn test_focus_keeps_edges_among_top_k() {
        let graph = chain();
        let focus = graph.layout(LayoutMode::Focus { top_k: 2 });
        assert_eq!(focus.nodes.len(), 2);
        assert_eq!(focus.edges.len(), 1);
    }

    #[test]
    fn test_neighborhood_depth() {
        let graph = chain();
        let center = ConceptId::from_label("calculus");
        let near = graph.layout(LayoutMode::Neighborhood { center, depth: 1 });
        assert_eq!(near.nodes.len(), 3);
        let wide = graph.layout(LayoutMode::Neighborhood { center, depth: 2 });
        assert_eq!(wide.nodes.len(), 4);
        let unknown = graph.layout(LayoutMode::Neighborhood {
            center: ConceptId::from_label("topology"),
            depth: 3,
        });
        assert!(unknown.nodes.is_empty());
    }

    #[test]
    fn test_centrality_uses_whole_graph() {
        let graph = chain();
        let layout = graph.layout(LayoutMode::Focus { top_k: 1 });
        assert_eq!(layout.nodes[0].degree, 1);
        assert!((layout.nodes[0].centrality - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(LayoutMode::Focus { top_k: 1 }.as_str(), "focus");
    }
}
