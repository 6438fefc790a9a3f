//! Error types for the model layer.

use entcache_record::RecordError;
use entcache_store::{ConfigError, StoreError};
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in model operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Invalid cache configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Setup was attempted without a transport or store.
    #[error("a transport or store is required to set up the cache")]
    MissingClient,

    #[error("you cannot clone a copy")]
    CloneOfCopy,

    #[error("you cannot reset a non-copy")]
    ResetNonCopy,

    #[error("you cannot call commit on a non-copy")]
    CommitNonCopy,

    /// The operation needs an id the record does not have yet.
    #[error("missing {field} property; you must create the data before you can {operation} it")]
    MissingId {
        field: String,
        operation: &'static str,
    },

    /// A model with this name is already registered for the alias.
    #[error("model {name} already registered for alias {alias}")]
    DuplicateModel { alias: String, name: String },

    /// The store answered with a payload of the wrong shape.
    #[error("unexpected store response to {0}")]
    UnexpectedPayload(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),
}
