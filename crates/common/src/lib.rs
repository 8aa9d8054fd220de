//! Shared types for the AAT gateway crates: redacted secrets and config errors

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
