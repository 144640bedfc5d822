//! Error types for registry operations

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("registry store error: {0}")]
    Store(#[from] common::Error),
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
