//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid claim target: {0}")]
    InvalidTarget(String),

    #[error("pool store error: {0}")]
    Store(#[from] common::Error),

    #[error("claim task aborted: {0}")]
    Aborted(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
