use crate::{Record, RecordResult, merge_with_accessors};
use entcache_types::Id;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a cached record.
pub type EntityRef = Arc<Entity>;

/// A record as it lives in the cache.
///
/// Every holder of an [`EntityRef`] for the same id sees the same record.
/// The clone marker is fixed at construction: a draft stays a draft and an
/// original stays an original.
#[derive(Debug)]
pub struct Entity {
    is_clone: bool,
    record: RwLock<Record>,
}

impl Entity {
    /// Wraps a record as an original.
    pub fn new(record: Record) -> EntityRef {
        Arc::new(Self {
            is_clone: false,
            record: RwLock::new(record),
        })
    }

    /// Wraps a record as a draft copy.
    pub fn new_clone(record: Record) -> EntityRef {
        Arc::new(Self {
            is_clone: true,
            record: RwLock::new(record),
        })
    }

    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> RecordResult<()> {
        self.write().set(key, value)
    }

    /// An owned copy of the current record, accessors included.
    pub fn snapshot(&self) -> Record {
        self.read().clone()
    }

    pub fn to_value(&self) -> Value {
        self.read().to_value()
    }

    pub fn effective_id(&self, id_field: &str, temp_id_field: &str) -> Option<Id> {
        self.read().effective_id(id_field, temp_id_field)
    }

    /// Accessor-preserving merge of `source` into this record.
    pub fn merge(&self, source: &Record) {
        merge_with_accessors(&mut self.write(), source);
    }

    /// Replaces the whole record.
    pub fn replace(&self, record: Record) {
        *self.write() = record;
    }
}
