//! Claim pool for credentialed actor accounts
//!
//! Owns the pool of actor accounts and performs identifier claims through them.
//! The `AccountStore` persists each account's credentials and busy lease; the
//! `Broker` serializes every claim attempt behind a single pool-wide lock.
//!
//! Claim lifecycle:
//! 1. Broker takes the claim lock (one attempt in flight across the pool)
//! 2. First free account in stored order is leased (`in_use = true`, persisted)
//! 3. Platform login → change identifier → logout, bounded by the claim timeout
//! 4. Lease released and persisted on every exit path
//! 5. Caller receives a tagged `ClaimOutcome`

pub mod broker;
pub mod error;
pub mod store;

pub use broker::{Broker, ClaimOutcome};
pub use error::{Error, Result};
pub use store::{AccountStore, AccountView, ActorRecord, Lease};
