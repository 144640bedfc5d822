//! Error types for monitor operations

/// Errors from a single poll or claim round-trip.
///
/// None of these are fatal: the dispatcher logs them and backs off.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Result alias for monitor operations.
pub type Result<T> = std::result::Result<T, Error>;
