//! Shared types for Liaison

pub mod error;

pub use error::{LiaisonError, Result};
