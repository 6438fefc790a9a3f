//! Core identifier types for entcache.
//!
//! This crate defines the small, dependency-light types every other layer
//! shares:
//! - [`Id`], the effective identifier of a cached record (server id or temp id)
//! - [`TempId`], the client-generated identifier a record carries until the
//!   server assigns its canonical id

mod ids;

pub use ids::{Id, TempId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid id value: {0}")]
    InvalidId(serde_json::Value),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
