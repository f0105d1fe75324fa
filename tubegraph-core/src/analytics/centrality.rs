use super::pagerank::pagerank;
use crate::error::{AnalyticsError, Result};
use crate::graph::GraphStore;
use crate::model::CentralityVector;
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};
use tubegraph_crawler::NodeId;

/// Sources per rayon task in the betweenness pass. Partial sums are reduced
/// in chunk order so the result does not depend on scheduling.
const BETWEENNESS_CHUNK: usize = 32;

/// Per-node centrality plus the warnings raised while computing it.
#[derive(Debug, Clone, Default)]
pub struct CentralityReport {
    pub values: HashMap<NodeId, CentralityVector>,
    pub warnings: Vec<String>,
}

/// Out-adjacency by node position, edges in insertion order.
pub(crate) fn out_adjacency(store: &GraphStore) -> Vec<Vec<usize>> {
    let graph = store.inner();
    let mut out = vec![Vec::new(); graph.node_count()];
    for edge in graph.edge_references() {
        out[edge.source().index()].push(edge.target().index());
    }
    out
}

/// Compute all four measures. A measure that fails to converge is replaced by
/// zeros and reported in `warnings`.
pub fn compute(
    store: &GraphStore,
    eigenvector_max_iterations: usize,
    pagerank_damping: f64,
    pagerank_max_iterations: usize,
    tolerance: f64,
) -> CentralityReport {
    let mut report = CentralityReport::default();
    let n = store.node_count();
    if n == 0 {
        return report;
    }

    let out = out_adjacency(store);
    let in_degree = in_degree_centrality(&out);
    let betweenness = betweenness_centrality(&out);
    debug!("Computed degree and betweenness for {} nodes", n);

    let mut fallback = |result: Result<Vec<f64>>| match result {
        Ok(values) => values,
        Err(e) => {
            warn!("{}; using zeros", e);
            report.warnings.push(e.to_string());
            vec![0.0; n]
        }
    };
    let eigenvector = fallback(eigenvector_centrality(
        &out,
        eigenvector_max_iterations,
        tolerance,
    ));
    let pagerank = fallback(pagerank(
        &out,
        pagerank_damping,
        pagerank_max_iterations,
        tolerance,
    ));

    for (pos, node) in store.nodes().enumerate() {
        report.values.insert(
            node.id.clone(),
            CentralityVector::new(
                in_degree[pos],
                betweenness[pos],
                eigenvector[pos],
                pagerank[pos],
            ),
        );
    }
    report
}

/// Incoming edges over `|V| - 1`. Self-loops are not counted.
pub fn in_degree_centrality(out: &[Vec<usize>]) -> Vec<f64> {
    let n = out.len();
    let mut counts = vec![0usize; n];
    for (v, targets) in out.iter().enumerate() {
        for &w in targets {
            if w != v {
                counts[w] += 1;
            }
        }
    }

    if n <= 1 {
        return vec![0.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    counts.into_iter().map(|c| c as f64 * scale).collect()
}

/// Brandes betweenness on the directed graph, normalized by `(n-1)(n-2)`.
pub fn betweenness_centrality(out: &[Vec<usize>]) -> Vec<f64> {
    let n = out.len();
    if n <= 2 {
        return vec![0.0; n];
    }

    let sources: Vec<usize> = (0..n).collect();
    let partials: Vec<Vec<f64>> = sources
        .par_chunks(BETWEENNESS_CHUNK)
        .map(|chunk| {
            let mut acc = vec![0.0; n];
            for &s in chunk {
                accumulate_single_source(out, s, &mut acc);
            }
            acc
        })
        .collect();

    let mut total = vec![0.0; n];
    for partial in partials {
        for (t, v) in total.iter_mut().zip(partial) {
            *t += v;
        }
    }

    let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    total.into_iter().map(|v| v * scale).collect()
}

fn accumulate_single_source(out: &[Vec<usize>], s: usize, acc: &mut [f64]) {
    let n = out.len();
    let mut order = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist: Vec<Option<usize>> = vec![None; n];
    sigma[s] = 1.0;
    dist[s] = Some(0);

    let mut queue = VecDeque::from([s]);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        let dv = dist[v].unwrap_or(0);
        for &w in &out[v] {
            if w == v {
                continue;
            }
            if dist[w].is_none() {
                dist[w] = Some(dv + 1);
                queue.push_back(w);
            }
            if dist[w] == Some(dv + 1) {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = order.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != s {
            acc[w] += delta[w];
        }
    }
}

/// In-edge eigenvector centrality by power iteration on `A^T + I`, starting
/// from the uniform vector and L2-normalizing every step.
pub fn eigenvector_centrality(
    out: &[Vec<usize>],
    max_iterations: usize,
    tolerance: f64,
) -> Result<Vec<f64>> {
    let n = out.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let threshold = n as f64 * tolerance;
    let mut x = vec![1.0 / n as f64; n];

    for iteration in 0..max_iterations {
        let mut next = x.clone();
        for (v, targets) in out.iter().enumerate() {
            for &w in targets {
                next[w] += x[v];
            }
        }

        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut next {
                *value /= norm;
            }
        }

        let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < threshold {
            debug!("Eigenvector converged after {} iterations", iteration + 1);
            return Ok(x);
        }
    }

    Err(AnalyticsError::ConvergenceFailure {
        measure: "eigenvector",
        iterations: max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); n];
        for &(a, b) in edges {
            out[a].push(b);
        }
        out
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_in_degree_star() {
        let out = adjacency(4, &[(1, 0), (2, 0), (3, 0)]);
        let values = in_degree_centrality(&out);
        assert!(close(values[0], 1.0));
        assert!(close(values[1], 0.0));
    }

    #[test]
    fn test_in_degree_ignores_self_loop() {
        let out = adjacency(2, &[(0, 0), (1, 0)]);
        let values = in_degree_centrality(&out);
        assert!(close(values[0], 1.0));

        let single = in_degree_centrality(&adjacency(1, &[(0, 0)]));
        assert!(close(single[0], 0.0));
    }

    #[test]
    fn test_betweenness_path() {
        // 0 -> 1 -> 2: node 1 lies on the single path 0 ~> 2.
        let out = adjacency(3, &[(0, 1), (1, 2)]);
        let values = betweenness_centrality(&out);
        assert!(close(values[0], 0.0));
        assert!(close(values[1], 0.5));
        assert!(close(values[2], 0.0));
    }

    #[test]
    fn test_betweenness_split_paths() {
        // Two equal shortest paths 0 -> {1,2} -> 3 share the credit.
        let out = adjacency(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let values = betweenness_centrality(&out);
        assert!(close(values[1], 0.5 / 6.0));
        assert!(close(values[2], 0.5 / 6.0));
    }

    #[test]
    fn test_betweenness_is_deterministic_across_chunks() {
        let n = 150;
        let edges: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| [(i, (i + 1) % n), (i, (i * 7 + 3) % n)])
            .collect();
        let out = adjacency(n, &edges);

        let first = betweenness_centrality(&out);
        let second = betweenness_centrality(&out);
        assert_eq!(first, second);
        assert!(first.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_eigenvector_cycle_is_uniform() {
        let out = adjacency(3, &[(0, 1), (1, 2), (2, 0)]);
        let values = eigenvector_centrality(&out, 1000, 1e-6).unwrap();
        let expected = 1.0 / 3f64.sqrt();
        assert!(values.iter().all(|v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn test_eigenvector_favors_sink() {
        let out = adjacency(3, &[(0, 2), (1, 2)]);
        let values = eigenvector_centrality(&out, 1000, 1e-6).unwrap();
        assert!(values[2] > values[0]);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_eigenvector_reports_non_convergence() {
        let out = adjacency(3, &[(0, 1), (1, 2)]);
        let result = eigenvector_centrality(&out, 2, 1e-12);
        assert!(matches!(
            result,
            Err(AnalyticsError::ConvergenceFailure {
                measure: "eigenvector",
                iterations: 2
            })
        ));
    }
}
