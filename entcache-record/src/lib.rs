//! Record model for entcache.
//!
//! Defines the data types every cached record is made of:
//! - [`Record`]: a field map where each field is either a plain JSON value
//!   or a computed [`Accessor`]
//! - [`separate_accessors`] / [`merge_with_accessors`]: the two-pass merge
//!   that copies data onto a record without flattening computed fields
//! - [`Entity`]: the shared, lockable cell a record lives in once it is
//!   cached, carrying the immutable clone marker
//!
//! The store and the model layer only ever hand out [`EntityRef`]s, so two
//! handles to the same id always observe the same record.

mod entity;
mod merge;
mod record;

pub use entity::{Entity, EntityRef};
pub use merge::{Separated, merge_with_accessors, separate_accessors};
pub use record::{Accessor, Field, Getter, Record, Setter};

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised while building or writing records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    /// Records can only be built from JSON objects.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(serde_json::Value),

    /// Write to a computed field that has no setter.
    #[error("field `{0}` is computed and has no setter")]
    ReadOnlyField(String),
}
