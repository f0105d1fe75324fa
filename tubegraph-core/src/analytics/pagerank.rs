use crate::error::{AnalyticsError, Result};
use tracing::debug;

/// PageRank with uniform teleport. Nodes without out-edges spread their mass
/// uniformly over all nodes.
pub fn pagerank(
    out: &[Vec<usize>],
    damping: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<Vec<f64>> {
    let n = out.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let nf = n as f64;
    let threshold = nf * tolerance;
    let mut x = vec![1.0 / nf; n];

    for iteration in 0..max_iterations {
        let dangling: f64 = out
            .iter()
            .zip(&x)
            .filter(|(targets, _)| targets.is_empty())
            .map(|(_, value)| value)
            .sum();

        let base = damping * dangling / nf + (1.0 - damping) / nf;
        let mut next = vec![base; n];
        for (v, targets) in out.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = damping * x[v] / targets.len() as f64;
            for &w in targets {
                next[w] += share;
            }
        }

        let change: f64 = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < threshold {
            debug!("PageRank converged after {} iterations", iteration + 1);
            return Ok(x);
        }
    }

    Err(AnalyticsError::ConvergenceFailure {
        measure: "pagerank",
        iterations: max_iterations,
    })
}
