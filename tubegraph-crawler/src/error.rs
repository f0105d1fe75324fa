use std::time::Duration;
use thiserror::Error;

/// Failure of a single relation source call. The crawler recovers from all
/// of these by treating the node's related list as empty.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Relation source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Rate limited by relation source")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::SourceUnavailable(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Invalid crawl depth {0}: depth must be at least 1")]
    InvalidDepth(usize),

    #[error("No seed ids provided")]
    NoSeeds,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
