use entcache_record::{EntityRef, Record};
use entcache_types::Id;
use serde_json::Value;

/// What flows in and out of store getters, mutations and actions.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    None,
    Id(Id),
    Value(Value),
    Record(Record),
    Entity(EntityRef),
    Entities(Vec<EntityRef>),
    /// Positional arguments, e.g. `[id, data, params]`.
    Tuple(Vec<Payload>),
}

impl Payload {
    pub fn tuple(items: impl IntoIterator<Item = Payload>) -> Self {
        Payload::Tuple(items.into_iter().collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// An id, either given directly or as a JSON scalar.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Payload::Id(id) => Some(id.clone()),
            Payload::Value(value) => Id::from_value(value),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<EntityRef> {
        match self {
            Payload::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn into_entities(self) -> Option<Vec<EntityRef>> {
        match self {
            Payload::Entities(entities) => Some(entities),
            Payload::Entity(entity) => Some(vec![entity]),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Payload::Value(value) => Some(value),
            Payload::Record(record) => Some(record.to_value()),
            Payload::Entity(entity) => Some(entity.to_value()),
            _ => None,
        }
    }

    /// A record view of the payload, whatever form the data came in.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Payload::Record(record) => Some(record),
            Payload::Value(value) => Record::from_value(value).ok(),
            Payload::Entity(entity) => Some(entity.snapshot()),
            _ => None,
        }
    }

    /// Splits a tuple into its items; any other payload is a one-item list.
    pub fn into_args(self) -> Vec<Payload> {
        match self {
            Payload::Tuple(items) => items,
            Payload::None => Vec::new(),
            other => vec![other],
        }
    }
}

impl From<Id> for Payload {
    fn from(id: Id) -> Self {
        Payload::Id(id)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<Record> for Payload {
    fn from(record: Record) -> Self {
        Payload::Record(record)
    }
}

impl From<EntityRef> for Payload {
    fn from(entity: EntityRef) -> Self {
        Payload::Entity(entity)
    }
}

impl From<Vec<EntityRef>> for Payload {
    fn from(entities: Vec<EntityRef>) -> Self {
        Payload::Entities(entities)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::None, Into::into)
    }
}
