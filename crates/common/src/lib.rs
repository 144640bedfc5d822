//! Common types shared by the handle-turbo crates

mod error;
pub mod persist;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
