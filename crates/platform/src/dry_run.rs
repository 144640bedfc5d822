//! Dry-run platform that performs no remote calls
//!
//! Every step succeeds and is logged. Used for local runs of the broker when
//! `[platform] mode = "dry_run"`, so the pool and dispatcher paths can be
//! exercised end to end without touching a real account.

use crate::{ActorPlatform, PlatformFuture, Session};
use common::Secret;
use tracing::info;

/// Platform that accepts every login and identifier change.
#[derive(Debug, Default)]
pub struct DryRunPlatform;

impl DryRunPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl ActorPlatform for DryRunPlatform {
    fn id(&self) -> &str {
        "dry_run"
    }

    fn login<'a>(
        &'a self,
        identity: &'a str,
        _secret: &'a Secret<String>,
    ) -> PlatformFuture<'a, Session> {
        Box::pin(async move {
            info!(actor = identity, "dry run: login");
            Ok(Session {
                identity: identity.to_string(),
                token: Secret::new(format!("dry-run-{identity}")),
            })
        })
    }

    fn change_identifier<'a>(
        &'a self,
        session: &'a Session,
        new_identifier: &'a str,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            info!(
                actor = %session.identity,
                target = new_identifier,
                "dry run: change identifier"
            );
            Ok(())
        })
    }

    fn logout(&self, session: Session) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            info!(actor = %session.identity, "dry run: logout");
            Ok(())
        })
    }
}
