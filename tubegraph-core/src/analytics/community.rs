use crate::graph::GraphStore;
use crate::model::CommunityId;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use tubegraph_crawler::NodeId;

/// Smallest modularity improvement that keeps a pass or a level going.
const MIN_GAIN: f64 = 1e-7;

/// Louvain result over the undirected projection.
#[derive(Debug, Clone, Default)]
pub struct CommunityPartition {
    pub assignments: HashMap<NodeId, CommunityId>,
    pub modularity: f64,
    /// Number of aggregation levels kept.
    pub levels: usize,
}

impl CommunityPartition {
    pub fn community_count(&self) -> usize {
        let mut ids: Vec<CommunityId> = self.assignments.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn community_of(&self, id: &str) -> Option<CommunityId> {
        self.assignments.get(id).copied()
    }
}

/// Undirected weighted graph by position. A non-loop edge is listed under
/// both endpoints; a self-loop once under its node.
struct WeightedGraph {
    adj: Vec<Vec<(usize, f64)>>,
    total_weight: f64,
}

impl WeightedGraph {
    fn from_pairs(n: usize, pairs: &BTreeMap<(usize, usize), f64>) -> Self {
        let mut adj = vec![Vec::new(); n];
        let mut total_weight = 0.0;
        for (&(a, b), &w) in pairs {
            total_weight += w;
            adj[a].push((b, w));
            if a != b {
                adj[b].push((a, w));
            }
        }
        Self { adj, total_weight }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    /// Weighted degree, self-loops counted twice.
    fn degree(&self, v: usize) -> f64 {
        self.adj[v]
            .iter()
            .map(|&(u, w)| if u == v { 2.0 * w } else { w })
            .sum()
    }

    fn loop_weight(&self, v: usize) -> f64 {
        self.adj[v]
            .iter()
            .filter(|(u, _)| *u == v)
            .map(|(_, w)| w)
            .sum()
    }

    /// Collapse each community into one node. Internal edges become a
    /// self-loop carrying their total weight.
    fn induced(&self, partition: &[usize], communities: usize) -> Self {
        let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (a, neighbors) in self.adj.iter().enumerate() {
            for &(b, w) in neighbors {
                if b < a {
                    continue;
                }
                let (ca, cb) = (partition[a], partition[b]);
                *pairs.entry((ca.min(cb), ca.max(cb))).or_insert(0.0) += w;
            }
        }
        Self::from_pairs(communities, &pairs)
    }
}

struct Status {
    node_to_comm: Vec<usize>,
    comm_degree: Vec<f64>,
    comm_internal: Vec<f64>,
    node_degree: Vec<f64>,
    node_loop: Vec<f64>,
    total_weight: f64,
}

impl Status {
    fn new(graph: &WeightedGraph) -> Self {
        let n = graph.len();
        let node_degree: Vec<f64> = (0..n).map(|v| graph.degree(v)).collect();
        let node_loop: Vec<f64> = (0..n).map(|v| graph.loop_weight(v)).collect();
        Self {
            node_to_comm: (0..n).collect(),
            comm_degree: node_degree.clone(),
            comm_internal: node_loop.clone(),
            node_degree,
            node_loop,
            total_weight: graph.total_weight,
        }
    }

    fn modularity(&self) -> f64 {
        let m = self.total_weight;
        if m <= 0.0 {
            return 0.0;
        }

        let mut used = vec![false; self.comm_degree.len()];
        for &c in &self.node_to_comm {
            used[c] = true;
        }
        used.iter()
            .enumerate()
            .filter(|(_, in_use)| **in_use)
            .map(|(c, _)| self.comm_internal[c] / m - (self.comm_degree[c] / (2.0 * m)).powi(2))
            .sum()
    }

    fn neighbor_communities(&self, graph: &WeightedGraph, node: usize) -> BTreeMap<usize, f64> {
        let mut weights = BTreeMap::new();
        for &(neighbor, w) in &graph.adj[node] {
            if neighbor != node {
                *weights.entry(self.node_to_comm[neighbor]).or_insert(0.0) += w;
            }
        }
        weights
    }

    fn remove(&mut self, node: usize, comm: usize, links: f64) {
        self.comm_degree[comm] -= self.node_degree[node];
        self.comm_internal[comm] -= links + self.node_loop[node];
    }

    fn insert(&mut self, node: usize, comm: usize, links: f64) {
        self.node_to_comm[node] = comm;
        self.comm_degree[comm] += self.node_degree[node];
        self.comm_internal[comm] += links + self.node_loop[node];
    }
}

/// Repeated local moves until a full pass gains less than `MIN_GAIN`.
fn one_level(graph: &WeightedGraph, status: &mut Status) {
    let two_m = 2.0 * status.total_weight;
    let mut current = status.modularity();

    loop {
        let mut modified = false;

        for node in 0..graph.len() {
            let comm = status.node_to_comm[node];
            let degree_share = status.node_degree[node] / two_m;
            let neighbors = status.neighbor_communities(graph, node);
            let own_links = neighbors.get(&comm).copied().unwrap_or(0.0);

            let remove_cost = -own_links
                + (status.comm_degree[comm] - status.node_degree[node]) * degree_share;
            status.remove(node, comm, own_links);

            let mut best = comm;
            let mut best_gain = 0.0;
            for (&candidate, &links) in &neighbors {
                let gain = remove_cost + links - status.comm_degree[candidate] * degree_share;
                if gain > best_gain {
                    best_gain = gain;
                    best = candidate;
                }
            }

            status.insert(node, best, neighbors.get(&best).copied().unwrap_or(0.0));
            if best != comm {
                modified = true;
            }
        }

        let updated = status.modularity();
        if !modified || updated - current < MIN_GAIN {
            break;
        }
        current = updated;
    }
}

/// Dense renumbering in order of first appearance.
fn renumber(node_to_comm: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let partition = node_to_comm
        .iter()
        .map(|c| {
            let next = mapping.len();
            *mapping.entry(*c).or_insert(next)
        })
        .collect();
    (partition, mapping.len())
}

/// Undirected projection with nodes ordered by id. One unit edge per
/// connected pair, self-loops kept.
fn undirected_projection(store: &GraphStore) -> (Vec<NodeId>, WeightedGraph) {
    let graph = store.inner();
    let mut order: Vec<usize> = (0..graph.node_count()).collect();
    order.sort_by(|a, b| {
        let ia = NodeIndex::new(*a);
        let ib = NodeIndex::new(*b);
        graph[ia].id.cmp(&graph[ib].id)
    });

    let mut position = vec![0usize; order.len()];
    for (pos, &idx) in order.iter().enumerate() {
        position[idx] = pos;
    }

    let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for edge in graph.edge_references() {
        let a = position[edge.source().index()];
        let b = position[edge.target().index()];
        pairs.insert((a.min(b), a.max(b)), 1.0);
    }

    let ids = order
        .iter()
        .map(|&idx| graph[NodeIndex::new(idx)].id.clone())
        .collect();
    (ids, WeightedGraph::from_pairs(order.len(), &pairs))
}

/// Louvain community detection on the undirected projection of the graph.
pub fn detect_communities(store: &GraphStore) -> CommunityPartition {
    let (ids, base) = undirected_projection(store);
    if ids.is_empty() {
        return CommunityPartition::default();
    }

    if base.total_weight == 0.0 {
        return CommunityPartition {
            assignments: ids
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id, i as CommunityId))
                .collect(),
            modularity: 0.0,
            levels: 1,
        };
    }

    let mut status = Status::new(&base);
    one_level(&base, &mut status);
    let mut modularity = status.modularity();
    let (partition, count) = renumber(&status.node_to_comm);
    let mut graph = base.induced(&partition, count);
    let mut dendrogram = vec![partition];

    loop {
        status = Status::new(&graph);
        one_level(&graph, &mut status);
        let updated = status.modularity();
        if updated - modularity < MIN_GAIN {
            break;
        }

        let (partition, count) = renumber(&status.node_to_comm);
        graph = graph.induced(&partition, count);
        dendrogram.push(partition);
        modularity = updated;
    }

    let composed: Vec<usize> = (0..ids.len())
        .map(|node| dendrogram.iter().fold(node, |c, level| level[c]))
        .collect();
    let (dense, _) = renumber(&composed);

    debug!(
        "Louvain finished with {} levels, modularity {:.4}",
        dendrogram.len(),
        modularity
    );

    CommunityPartition {
        assignments: ids
            .into_iter()
            .zip(dense)
            .map(|(id, c)| (id, c as CommunityId))
            .collect(),
        modularity,
        levels: dendrogram.len(),
    }
}
