//! Actor platform abstraction
//!
//! Defines the `ActorPlatform` trait that decouples the claim broker from the
//! remote account-automation client. A claim is always the same three calls
//! against the platform: log in with an actor's credentials, change the
//! actor's identifier to the target, log out. `DryRunPlatform` performs no
//! remote calls; the service binary provides an HTTP bridge implementation.

pub mod dry_run;

pub use dry_run::DryRunPlatform;

use common::Secret;
use std::future::Future;
use std::pin::Pin;

/// An authenticated session for one actor.
///
/// Opaque to the broker: it is produced by `login` and handed back to
/// `change_identifier` and `logout` unchanged.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: String,
    pub token: Secret<String>,
}

/// Errors from the remote platform, tagged by the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("login failed: {0}")]
    Login(String),

    #[error("identifier change failed: {0}")]
    ChangeIdentifier(String),

    #[error("logout failed: {0}")]
    Logout(String),

    #[error("platform transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    /// Short label of the failed step for logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            PlatformError::Login(_) => "login",
            PlatformError::ChangeIdentifier(_) => "change_identifier",
            PlatformError::Logout(_) => "logout",
            PlatformError::Transport(_) => "transport",
        }
    }
}

/// Result alias for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Boxed future returned by platform operations.
pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remote account-automation capability used by the claim broker.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn ActorPlatform>`).
pub trait ActorPlatform: Send + Sync {
    /// Identifier for logging (e.g. "dry_run", "http")
    fn id(&self) -> &str;

    /// Authenticate an actor and open a session.
    fn login<'a>(
        &'a self,
        identity: &'a str,
        secret: &'a Secret<String>,
    ) -> PlatformFuture<'a, Session>;

    /// Change the session's account identifier to `new_identifier`.
    fn change_identifier<'a>(
        &'a self,
        session: &'a Session,
        new_identifier: &'a str,
    ) -> PlatformFuture<'a, ()>;

    /// Close the session.
    fn logout(&self, session: Session) -> PlatformFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_match_variants() {
        assert_eq!(PlatformError::Login("x".into()).stage(), "login");
        assert_eq!(
            PlatformError::ChangeIdentifier("x".into()).stage(),
            "change_identifier"
        );
        assert_eq!(PlatformError::Logout("x".into()).stage(), "logout");
        assert_eq!(PlatformError::Transport("x".into()).stage(), "transport");
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            identity: "worker-1".into(),
            token: Secret::new("sess-abc".into()),
        };
        let debug = format!("{session:?}");
        assert!(debug.contains("worker-1"));
        assert!(!debug.contains("sess-abc"));
    }
}
