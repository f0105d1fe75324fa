pub mod centrality;
pub mod community;
pub mod influence;
pub mod pagerank;

pub use centrality::{CentralityReport, compute as compute_centrality};
pub use community::{CommunityPartition, detect_communities};
pub use influence::InfluenceWeights;

use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{AnalyzedNode, CommunityId, GraphSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Knobs of the analytics pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub weights: InfluenceWeights,
    pub eigenvector_max_iterations: usize,
    pub pagerank_damping: f64,
    pub pagerank_max_iterations: usize,
    pub tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            weights: InfluenceWeights::DEFAULT,
            eigenvector_max_iterations: 1000,
            pagerank_damping: 0.85,
            pagerank_max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

impl AnalysisConfig {
    pub fn with_weights(mut self, weights: InfluenceWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Output of [`analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub snapshot: GraphSnapshot,
    pub modularity: f64,
    pub community_levels: usize,
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Nodes by descending influence, ties broken by id.
    pub fn top_by_influence(&self, n: usize) -> Vec<&AnalyzedNode> {
        let mut nodes: Vec<&AnalyzedNode> = self.snapshot.nodes.iter().collect();
        nodes.sort_by(|a, b| {
            b.influence
                .total_cmp(&a.influence)
                .then_with(|| a.video.id.cmp(&b.video.id))
        });
        nodes.truncate(n);
        nodes
    }

    /// `(community, size)` pairs, largest first.
    pub fn communities_by_size(&self) -> Vec<(CommunityId, usize)> {
        let mut sizes: BTreeMap<CommunityId, usize> = BTreeMap::new();
        for node in &self.snapshot.nodes {
            *sizes.entry(node.community).or_insert(0) += 1;
        }
        let mut sizes: Vec<(CommunityId, usize)> = sizes.into_iter().collect();
        sizes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        sizes
    }

    pub fn community_count(&self) -> usize {
        self.communities_by_size().len()
    }
}

/// Run centrality, influence scoring and community detection over a fully
/// built graph. Only an inconsistent graph is fatal; a measure that does not
/// converge is zeroed and reported in `warnings`.
pub fn analyze(store: &GraphStore, config: &AnalysisConfig) -> Result<AnalysisResult> {
    store.validate()?;

    info!(
        "Analyzing graph with {} nodes and {} edges",
        store.node_count(),
        store.edge_count()
    );

    let centrality = compute_centrality(
        store,
        config.eigenvector_max_iterations,
        config.pagerank_damping,
        config.pagerank_max_iterations,
        config.tolerance,
    );
    let partition = detect_communities(store);

    let nodes = store
        .nodes()
        .map(|video| {
            let centrality = centrality
                .values
                .get(&video.id)
                .copied()
                .unwrap_or_default();
            AnalyzedNode {
                video: video.clone(),
                influence: config.weights.score(&centrality),
                centrality,
                community: partition.community_of(&video.id).unwrap_or_default(),
            }
        })
        .collect();

    let result = AnalysisResult {
        snapshot: GraphSnapshot {
            nodes,
            edges: store.edges(),
        },
        modularity: partition.modularity,
        community_levels: partition.levels,
        warnings: centrality.warnings,
    };

    info!(
        "Found {} communities (modularity {:.4})",
        result.community_count(),
        result.modularity
    );
    Ok(result)
}
