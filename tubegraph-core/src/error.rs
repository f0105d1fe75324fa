use thiserror::Error;

/// Failures of the analytics pass.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("{measure} did not converge within {iterations} iterations")]
    ConvergenceFailure {
        measure: &'static str,
        iterations: usize,
    },

    #[error("invalid graph state: {0}")]
    InvalidGraphState(String),

    #[error("invalid influence weights: {0}")]
    InvalidWeights(String),
}

/// Failures of checkpoint persistence and export.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid related-videos CSV: {0}")]
    InvalidCsv(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} has no checkpoint")]
    NoCheckpoint(String),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
