//! Availability registry
//!
//! Durable mapping from identifier to availability. The registry is a gate in
//! front of the claim path: the monitor checks it on every poll and the entry
//! flips to unavailable once a claim lands. An entry never flips back within
//! this crate; the remote platform stays authoritative for re-releases.

pub mod error;
pub mod registry;

pub use error::{Error, Result};
pub use registry::{Registry, RegistryData};
