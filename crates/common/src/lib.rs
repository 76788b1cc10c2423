//! Shared error definitions used across the idgate crates.

pub mod error;

pub use error::{Error, FromMessage, Result};
