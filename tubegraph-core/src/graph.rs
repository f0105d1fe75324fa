use crate::error::{AnalyticsError, Result};
use crate::model::{Edge, GraphSnapshot, VideoNode};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use tubegraph_crawler::{CrawlCheckpoint, EdgeRecord, NodeId, VideoMetadata};

/// Directed related-video graph keyed by video id.
///
/// Nodes and edges keep insertion order. Duplicate edges collapse; self-loops
/// are kept.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    graph: DiGraph<VideoNode, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from crawl output. Parents are created first, then each
    /// child's metadata is merged, then the edge is added.
    pub fn from_records(records: &[EdgeRecord]) -> Self {
        let mut store = Self::new();
        for record in records {
            store.add_node(&record.parent, &VideoMetadata::default());
            store.add_node(&record.child, &record.metadata);
            store.add_edge(&record.parent, &record.child);
        }
        store
    }

    /// Rebuild the graph a checkpoint describes. Visited ids without edges
    /// become isolated nodes.
    pub fn from_checkpoint(checkpoint: &CrawlCheckpoint) -> Self {
        let mut store = Self::from_records(&checkpoint.edges);

        let mut isolated: Vec<&NodeId> = checkpoint
            .visited
            .iter()
            .filter(|id| !store.contains_node(id))
            .collect();
        isolated.sort();
        for id in isolated {
            store.add_node(id, &VideoMetadata::default());
        }
        store
    }

    pub fn try_from_snapshot(snapshot: &GraphSnapshot) -> Result<Self> {
        let mut store = Self::new();
        for node in &snapshot.nodes {
            store.add_node(&node.video.id, &node.video.metadata());
        }
        for edge in &snapshot.edges {
            for endpoint in [&edge.parent, &edge.child] {
                if !store.contains_node(endpoint) {
                    return Err(AnalyticsError::InvalidGraphState(format!(
                        "edge {} -> {} references unknown node {}",
                        edge.parent, edge.child, endpoint
                    )));
                }
            }
            store.add_edge(&edge.parent, &edge.child);
        }
        Ok(store)
    }

    /// Insert a node, or fill the still-empty fields of an existing one.
    pub fn add_node(&mut self, id: &str, metadata: &VideoMetadata) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            self.graph[idx].merge(metadata);
            return idx;
        }

        let idx = self.graph.add_node(VideoNode::with_metadata(id, metadata));
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Add `parent -> child`. Missing endpoints are created with empty
    /// metadata. Returns false when the edge already existed.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> bool {
        let from = self.add_node(parent, &VideoMetadata::default());
        let to = self.add_node(child, &VideoMetadata::default());

        if self.graph.contains_edge(from, to) {
            return false;
        }
        self.graph.add_edge(from, to, ());
        true
    }

    pub fn node(&self, id: &str) -> Option<&VideoNode> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn contains_edge(&self, parent: &str, child: &str) -> bool {
        match (self.index.get(parent), self.index.get(child)) {
            (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
            _ => false,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &VideoNode> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .edge_references()
            .map(|e| Edge::new(&self.graph[e.source()].id, &self.graph[e.target()].id))
            .collect()
    }

    /// Children of `id`, in the order their edges were added.
    pub fn out_neighbors(&self, id: &str) -> Vec<&VideoNode> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Outgoing).collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| &self.graph[e.target()]).collect()
    }

    /// Number of distinct incoming edges, a self-loop included.
    pub fn in_degree(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|&idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check that the id index and the node storage agree and that no edge is
    /// duplicated.
    pub fn validate(&self) -> Result<()> {
        if self.index.len() != self.graph.node_count() {
            return Err(AnalyticsError::InvalidGraphState(format!(
                "index holds {} ids but graph holds {} nodes",
                self.index.len(),
                self.graph.node_count()
            )));
        }

        for (id, &idx) in &self.index {
            match self.graph.node_weight(idx) {
                Some(node) if node.id == *id => {}
                Some(node) => {
                    return Err(AnalyticsError::InvalidGraphState(format!(
                        "id {} is indexed to node {}",
                        id, node.id
                    )));
                }
                None => {
                    return Err(AnalyticsError::InvalidGraphState(format!(
                        "id {} points at a missing node",
                        id
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for edge in self.graph.edge_references() {
            if !seen.insert((edge.source(), edge.target())) {
                return Err(AnalyticsError::InvalidGraphState(format!(
                    "duplicate edge {} -> {}",
                    self.graph[edge.source()].id,
                    self.graph[edge.target()].id
                )));
            }
        }

        Ok(())
    }

    /// Underlying petgraph storage, for the analytics passes.
    pub(crate) fn inner(&self) -> &DiGraph<VideoNode, ()> {
        &self.graph
    }
}
