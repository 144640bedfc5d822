//! Service-specific error types

use thiserror::Error;

/// Startup errors for the `handle-turbo` binary.
///
/// Request-level failures are answered directly as HTTP responses by the
/// handlers; only problems that prevent a role from starting live here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("usage: handle-turbo <registry|broker|monitor> [--config PATH]{0}")]
    Usage(String),

    #[error("unknown role: {0} (expected registry, broker or monitor)")]
    UnknownRole(String),

    #[error("[{0}] section is required for this role")]
    MissingSection(&'static str),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
