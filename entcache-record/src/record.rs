use crate::{RecordError, RecordResult};
use entcache_types::Id;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Computes a field's value from the record it lives on.
pub type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Receives a write to a computed field.
pub type Setter = Arc<dyn Fn(&mut Record, Value) + Send + Sync>;

/// A computed field: reads go through the getter every time, writes go
/// through the setter when one exists.
#[derive(Clone)]
pub struct Accessor {
    get: Getter,
    set: Option<Setter>,
}

impl Accessor {
    /// A read-only computed field.
    pub fn getter(get: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }

    /// Adds a setter, making the field writable.
    pub fn with_setter(mut self, set: impl Fn(&mut Record, Value) + Send + Sync + 'static) -> Self {
        self.set = Some(Arc::new(set));
        self
    }

    /// Evaluates the getter against `record`.
    pub fn read(&self, record: &Record) -> Value {
        (self.get)(record)
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    /// Whether both accessors share the same getter.
    pub fn ptr_eq(&self, other: &Accessor) -> bool {
        Arc::ptr_eq(&self.get, &other.get)
    }

    pub(crate) fn setter(&self) -> Option<Setter> {
        self.set.clone()
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// One field of a [`Record`].
#[derive(Debug, Clone)]
pub enum Field {
    Value(Value),
    Accessor(Accessor),
}

impl Field {
    pub fn is_accessor(&self) -> bool {
        matches!(self, Field::Accessor(_))
    }
}

/// A cached record: field name to plain value or computed accessor.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: BTreeMap<String, Field>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON object. Any other JSON value is rejected.
    pub fn from_value(value: Value) -> RecordResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::from(map)),
            other => Err(RecordError::NotAnObject(other)),
        }
    }

    /// Builder-style plain field insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder-style accessor definition.
    pub fn with_accessor(mut self, key: &str, accessor: Accessor) -> Self {
        self.define(key, accessor);
        self
    }

    /// Reads a field. Computed fields are evaluated on every read.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.fields.get(key)? {
            Field::Value(value) => Some(value.clone()),
            Field::Accessor(accessor) => Some(accessor.read(self)),
        }
    }

    /// The raw field, without evaluating accessors.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_accessor(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(Field::is_accessor)
    }

    /// Assigns a value the way a property write would: a writable accessor
    /// receives it through its setter, a read-only accessor rejects it, and
    /// anything else is stored as a plain value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> RecordResult<()> {
        let value = value.into();
        let setter = match self.fields.get(key) {
            Some(Field::Accessor(accessor)) => Some(
                accessor
                    .setter()
                    .ok_or_else(|| RecordError::ReadOnlyField(key.to_string()))?,
            ),
            _ => None,
        };
        match setter {
            Some(setter) => setter(self, value),
            None => {
                self.fields.insert(key.to_string(), Field::Value(value));
            }
        }
        Ok(())
    }

    /// Stores a plain value, replacing whatever was there (accessors included).
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields
            .insert(key.to_string(), Field::Value(value.into()));
    }

    /// (Re)defines `key` as a computed field.
    pub fn define(&mut self, key: &str, accessor: Accessor) {
        self.fields
            .insert(key.to_string(), Field::Accessor(accessor));
    }

    pub fn remove(&mut self, key: &str) -> Option<Field> {
        self.fields.remove(key)
    }

    /// Drops every plain value, keeping computed fields.
    pub fn clear_values(&mut self) {
        self.fields.retain(|_, field| field.is_accessor());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Snapshot of the record as a JSON object, with computed fields
    /// evaluated.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, field)| {
                let value = match field {
                    Field::Value(value) => value.clone(),
                    Field::Accessor(accessor) => accessor.read(self),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// The canonical id held in `id_field`, if any.
    pub fn id(&self, id_field: &str) -> Option<Id> {
        self.get(id_field).as_ref().and_then(Id::from_value)
    }

    /// The canonical id if present, else the temp id.
    pub fn effective_id(&self, id_field: &str, temp_id_field: &str) -> Option<Id> {
        self.id(id_field).or_else(|| self.id(temp_id_field))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(key, value)| (key, Field::Value(value)))
                .collect(),
        }
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> RecordResult<Self> {
        Self::from_value(value)
    }
}
