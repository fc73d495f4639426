//! Error types for the matching engine.

use thiserror::Error;

/// Result type alias using `MatchError`
pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    /// Location has no usable file name component (e.g. "" or "/music/")
    #[error("Invalid file location: '{location}'")]
    InvalidLocation { location: String },

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rayon::ThreadPoolBuildError> for MatchError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MatchError::WorkerPool(err.to_string())
    }
}
