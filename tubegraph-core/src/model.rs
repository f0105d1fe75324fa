use serde::{Deserialize, Serialize};
use tubegraph_crawler::{NodeId, VideoMetadata};

pub type CommunityId = u64;

/// A video in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoNode {
    pub id: NodeId,
    pub title: String,
    pub channel: String,
    pub view_count: u64,
    pub duration_seconds: u64,
}

impl VideoNode {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(id: impl Into<NodeId>, metadata: &VideoMetadata) -> Self {
        let mut node = Self::new(id);
        node.merge(metadata);
        node
    }

    /// Fill fields that are still unknown. Known fields are never overwritten.
    pub fn merge(&mut self, metadata: &VideoMetadata) {
        if self.title.is_empty() && !metadata.title.is_empty() {
            self.title = metadata.title.clone();
        }
        if self.channel.is_empty() && !metadata.channel.is_empty() {
            self.channel = metadata.channel.clone();
        }
        if self.view_count == 0 {
            self.view_count = metadata.view_count;
        }
        if self.duration_seconds == 0 {
            self.duration_seconds = metadata.duration_seconds;
        }
    }

    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            title: self.title.clone(),
            channel: self.channel.clone(),
            view_count: self.view_count,
            duration_seconds: self.duration_seconds,
        }
    }
}

/// Directed "child is related to parent" relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
}

impl Edge {
    pub fn new(parent: impl Into<NodeId>, child: impl Into<NodeId>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// The four centrality measures of one node, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CentralityVector {
    pub in_degree: f64,
    pub betweenness: f64,
    pub eigenvector: f64,
    pub pagerank: f64,
}

impl CentralityVector {
    pub fn new(in_degree: f64, betweenness: f64, eigenvector: f64, pagerank: f64) -> Self {
        Self {
            in_degree,
            betweenness,
            eigenvector,
            pagerank,
        }
    }
}

/// A node with every analytic attribute attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedNode {
    #[serde(flatten)]
    pub video: VideoNode,
    #[serde(flatten)]
    pub centrality: CentralityVector,
    pub influence: f64,
    pub community: CommunityId,
}

/// Read-only view handed to exporters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<AnalyzedNode>,
    pub edges: Vec<Edge>,
}
