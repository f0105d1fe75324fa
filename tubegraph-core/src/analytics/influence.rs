use crate::error::{AnalyticsError, Result};
use crate::model::CentralityVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Weights of the composite influence score. They are non-negative and sum
/// to 1, so a score of measures in [0, 1] is also in [0, 1].
/// Serialized as `[in_degree, betweenness, eigenvector, pagerank]`; decoding
/// goes through [`InfluenceWeights::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct InfluenceWeights {
    in_degree: f64,
    betweenness: f64,
    eigenvector: f64,
    pagerank: f64,
}

impl InfluenceWeights {
    pub const DEFAULT: InfluenceWeights = InfluenceWeights {
        in_degree: 0.4,
        betweenness: 0.3,
        eigenvector: 0.2,
        pagerank: 0.1,
    };

    pub fn new(in_degree: f64, betweenness: f64, eigenvector: f64, pagerank: f64) -> Result<Self> {
        let weights = [in_degree, betweenness, eigenvector, pagerank];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalyticsError::InvalidWeights(format!(
                "weights must be non-negative, got {:?}",
                weights
            )));
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AnalyticsError::InvalidWeights(format!(
                "weights must sum to 1.0, got {}",
                sum
            )));
        }

        Ok(Self {
            in_degree,
            betweenness,
            eigenvector,
            pagerank,
        })
    }

    pub fn in_degree(&self) -> f64 {
        self.in_degree
    }

    pub fn betweenness(&self) -> f64 {
        self.betweenness
    }

    pub fn eigenvector(&self) -> f64 {
        self.eigenvector
    }

    pub fn pagerank(&self) -> f64 {
        self.pagerank
    }

    pub fn score(&self, centrality: &CentralityVector) -> f64 {
        let score = self.in_degree * centrality.in_degree
            + self.betweenness * centrality.betweenness
            + self.eigenvector * centrality.eigenvector
            + self.pagerank * centrality.pagerank;
        score.clamp(0.0, 1.0)
    }
}

impl Default for InfluenceWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for InfluenceWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.in_degree, self.betweenness, self.eigenvector, self.pagerank
        )
    }
}

impl TryFrom<[f64; 4]> for InfluenceWeights {
    type Error = AnalyticsError;

    fn try_from([a, b, c, d]: [f64; 4]) -> Result<Self> {
        Self::new(a, b, c, d)
    }
}

impl From<InfluenceWeights> for [f64; 4] {
    fn from(w: InfluenceWeights) -> Self {
        [w.in_degree, w.betweenness, w.eigenvector, w.pagerank]
    }
}

/// Parses `in_degree,betweenness,eigenvector,pagerank`.
impl FromStr for InfluenceWeights {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| AnalyticsError::InvalidWeights(format!("'{}': {}", s, e)))?;

        match values.as_slice() {
            &[a, b, c, d] => Self::new(a, b, c, d),
            _ => Err(AnalyticsError::InvalidWeights(format!(
                "expected four comma-separated weights, got '{}'",
                s
            ))),
        }
    }
}
