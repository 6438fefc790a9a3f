//! Error types for the store layer.

use entcache_record::RecordError;
use entcache_types::Id;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error reported by the remote service.
///
/// Kept `Clone` so the same error can sit in an `errorOnX` slot and be
/// returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{name} ({code}): {message}")]
pub struct ServiceError {
    pub name: String,
    pub code: u16,
    pub message: String,
}

impl ServiceError {
    pub fn new(name: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code,
            message: message.into(),
        }
    }

    /// A transport-level failure (no response from the server).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("Unavailable", 503, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFound", 404, message)
    }

    /// The service answered with a body the store cannot read.
    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::new("BadResponse", 502, message)
    }
}

/// Errors raised by the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No module is registered under this namespace.
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    /// A module is already registered under this namespace.
    #[error("namespace already registered: {0}")]
    DuplicateNamespace(String),

    /// Address is not of the form `<namespace>/<name>`.
    #[error("malformed store address: {0}")]
    MalformedAddress(String),

    #[error("unknown getter: {0}")]
    UnknownGetter(String),

    #[error("unknown mutation: {0}")]
    UnknownMutation(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The payload does not have the shape the operation expects.
    #[error("invalid payload for {operation}: expected {expected}")]
    InvalidPayload {
        operation: String,
        expected: &'static str,
    },

    /// No stored record has this id.
    #[error("record not found: {0}")]
    NotFound(Id),

    /// No outstanding copy has this id.
    #[error("copy not found: {0}")]
    CopyNotFound(Id),

    /// The stored record has no usable id.
    #[error("record has no id in `{0}`")]
    MissingId(String),

    /// A `find` query the local filter cannot evaluate.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// The remote service rejected the request.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Errors in cache configuration. Fatal at setup time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a server alias is required")]
    MissingServerAlias,

    #[error("option `{0}` must not be empty")]
    EmptyOption(&'static str),

    /// `nameStyle = explicit` without a namespace.
    #[error("service `{0}` needs an explicit namespace")]
    MissingNamespace(String),

    #[error("invalid configuration: {0}")]
    Parse(String),
}
