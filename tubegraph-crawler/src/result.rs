use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque video identifier.
pub type NodeId = String;

/// Descriptive fields carried by a video. Empty strings and zero counts mean
/// "not known yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub channel: String,
    pub view_count: u64,
    pub duration_seconds: u64,
}

impl VideoMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.channel.is_empty()
            && self.view_count == 0
            && self.duration_seconds == 0
    }
}

/// One entry returned by a relation source for a given node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedVideo {
    pub id: NodeId,
    #[serde(flatten)]
    pub metadata: VideoMetadata,
}

impl RelatedVideo {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            metadata: VideoMetadata::default(),
        }
    }

    pub fn with_metadata(id: impl Into<NodeId>, metadata: VideoMetadata) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }
}

/// A discovered relation: `child` was returned as related to `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub parent: NodeId,
    pub child: NodeId,
    #[serde(default)]
    pub metadata: VideoMetadata,
}

impl EdgeRecord {
    pub fn from_related(parent: &str, related: RelatedVideo) -> Self {
        Self {
            parent: parent.to_string(),
            child: related.id,
            metadata: related.metadata,
        }
    }
}

/// Everything a crawl produced, including partial results of a stopped run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub edges: Vec<EdgeRecord>,
    pub visited: HashSet<NodeId>,
    /// Number of BFS levels fully expanded, counting levels restored from a checkpoint.
    pub levels: usize,
    /// Ids whose relation source call failed and were treated as having no relations.
    pub skipped: Vec<NodeId>,
    /// True when the stop signal ended the crawl at a level boundary.
    pub stopped: bool,
}

impl CrawlOutcome {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn checkpoint(&self) -> CrawlCheckpoint {
        CrawlCheckpoint {
            visited: self.visited.clone(),
            edges: self.edges.clone(),
            level: self.levels,
        }
    }
}

/// Persistable crawl state, sufficient to resume a crawl or rebuild its graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
    pub visited: HashSet<NodeId>,
    pub edges: Vec<EdgeRecord>,
    pub level: usize,
}

impl CrawlCheckpoint {
    /// Ids discovered by the last completed level and not yet expanded, in
    /// discovery order.
    pub fn pending_frontier(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|edge| !self.visited.contains(&edge.child))
            .filter(|edge| seen.insert(edge.child.clone()))
            .map(|edge| edge.child.clone())
            .collect()
    }
}
