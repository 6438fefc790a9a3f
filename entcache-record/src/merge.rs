//! Accessor-preserving merge.
//!
//! Copying a record field by field with [`Record::get`] would evaluate every
//! computed field once and store the result as a plain value, so later reads
//! would no longer track the fields the getter depends on. These helpers keep
//! accessors as accessors.

use crate::{Field, Record};

/// A record split into its computed fields and its plain fields.
#[derive(Debug, Clone, Default)]
pub struct Separated {
    pub accessors: Record,
    pub values: Record,
}

/// Partitions `record` into accessors and plain values.
pub fn separate_accessors(record: &Record) -> Separated {
    let mut separated = Separated::default();
    for (key, field) in record.iter() {
        match field {
            Field::Accessor(accessor) => separated.accessors.define(key, accessor.clone()),
            Field::Value(value) => separated.values.insert(key, value.clone()),
        }
    }
    separated
}

/// Applies `source` onto `target`.
///
/// - An accessor in `source` is (re)defined as an accessor on `target`.
/// - A plain value is assigned: through the setter when `target` holds a
///   writable accessor under that key, skipped when it holds a read-only
///   accessor, stored directly otherwise.
pub fn merge_with_accessors(target: &mut Record, source: &Record) {
    for (key, field) in source.iter() {
        match field {
            Field::Accessor(accessor) => target.define(key, accessor.clone()),
            Field::Value(value) => {
                let read_only = matches!(
                    target.field(key),
                    Some(Field::Accessor(existing)) if !existing.is_writable()
                );
                if !read_only {
                    // cannot fail: read-only accessors were filtered out
                    let _ = target.set(key, value.clone());
                }
            }
        }
    }
}
