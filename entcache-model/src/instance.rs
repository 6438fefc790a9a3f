//! Instances: one cached record plus the model it belongs to.
//!
//! Drafts follow a small state machine. [`Instance::clone`] turns a stored
//! record into a draft; [`Instance::reset`] and [`Instance::commit`] only
//! work on drafts. All three resolve against the store right away.

use crate::error::{ModelError, ModelResult};
use crate::model::Model;
use entcache_record::EntityRef;
use entcache_store::Payload;
use entcache_types::Id;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct Instance {
    entity: EntityRef,
    model: Model,
}

impl Instance {
    pub(crate) fn new(entity: EntityRef, model: Model) -> Self {
        Self { entity, model }
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Another handle on the same record.
    pub fn share(&self) -> Instance {
        Instance::new(self.entity.clone(), self.model.clone())
    }

    /// Whether both handles point at the same stored record.
    pub fn same_record(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity)
    }

    pub fn is_clone(&self) -> bool {
        self.entity.is_clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entity.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        Ok(self.entity.set(key, value)?)
    }

    /// The server-assigned id, if any.
    pub fn id(&self) -> Option<Id> {
        self.entity.read().id(&self.model.options().id_field)
    }

    pub fn effective_id(&self) -> Option<Id> {
        let options = self.model.options();
        self.entity
            .effective_id(&options.id_field, &options.temp_id_field)
    }

    /// Plain JSON view with computed fields evaluated.
    pub fn to_value(&self) -> Value {
        self.entity.to_value()
    }

    fn require_effective_id(&self, operation: &'static str) -> ModelResult<Id> {
        self.effective_id().ok_or_else(|| ModelError::MissingId {
            field: self.model.options().id_field.clone(),
            operation,
        })
    }

    fn require_id(&self, operation: &'static str) -> ModelResult<Id> {
        self.id().ok_or_else(|| ModelError::MissingId {
            field: self.model.options().id_field.clone(),
            operation,
        })
    }

    // ── Drafts ──────────────────────────────────────────────────

    /// Makes a draft of this record. Any earlier draft for the id is
    /// replaced.
    #[allow(clippy::should_implement_trait)]
    pub fn clone(&self) -> ModelResult<Instance> {
        if self.is_clone() {
            return Err(ModelError::CloneOfCopy);
        }
        let id = self.require_effective_id("clone")?;
        let bridge = self.model.bridge();
        let created = bridge.commit("createCopy", Payload::Id(id.clone()))?;
        let copy = if self.model.options().keep_copies_in_store {
            bridge.getters("getCopyById", Some(Payload::Id(id)))?
        } else {
            created
        };
        copy.into_entity()
            .map(|entity| Instance::new(entity, self.model.clone()))
            .ok_or_else(|| ModelError::UnexpectedPayload("createCopy".to_string()))
    }

    /// Discards the draft's edits by copying the stored record over it.
    pub fn reset(&self) -> ModelResult<()> {
        if !self.is_clone() {
            return Err(ModelError::ResetNonCopy);
        }
        let id = self.require_effective_id("reset")?;
        self.model.bridge().commit("resetCopy", Payload::Id(id))?;
        Ok(())
    }

    /// Writes the draft's fields onto the stored record. The draft stays a
    /// draft.
    pub fn commit(&self) -> ModelResult<&Self> {
        if !self.is_clone() {
            return Err(ModelError::CommitNonCopy);
        }
        let id = self.require_effective_id("commit")?;
        self.model.bridge().commit("commitCopy", Payload::Id(id))?;
        Ok(self)
    }

    // ── Remote ──────────────────────────────────────────────────

    /// Creates the record when it has no id yet, otherwise updates or
    /// patches it depending on `preferUpdate`.
    pub async fn save(&self, params: Value) -> ModelResult<Instance> {
        if self.id().is_none() {
            return self.create(params).await;
        }
        if self.model.options().prefer_update {
            self.update(params).await
        } else {
            self.patch(params).await
        }
    }

    pub async fn create(&self, params: Value) -> ModelResult<Instance> {
        let mut data = self.to_value();
        let id_field = &self.model.options().id_field;
        if let Value::Object(map) = &mut data {
            if map.get(id_field).is_some_and(Value::is_null) {
                map.remove(id_field);
            }
        }
        debug!(model = %self.model.name(), "create");
        let payload = Payload::tuple([Payload::Value(data), Payload::Value(params)]);
        let created = self.model.bridge().dispatch("create", payload).await?;
        self.wrap_response("create", created)
    }

    pub async fn update(&self, params: Value) -> ModelResult<Instance> {
        self.write("update", params).await
    }

    pub async fn patch(&self, params: Value) -> ModelResult<Instance> {
        self.write("patch", params).await
    }

    /// Sends the record itself so the store can tell a draft from the
    /// stored original when diffing a patch.
    async fn write(&self, operation: &'static str, params: Value) -> ModelResult<Instance> {
        let id = self.require_id(operation)?;
        let payload = Payload::tuple([
            Payload::Id(id),
            Payload::Entity(self.entity.clone()),
            Payload::Value(params),
        ]);
        let written = self.model.bridge().dispatch(operation, payload).await?;
        self.wrap_response(operation, written)
    }

    /// Deletes the record on the service and drops it from the store.
    /// Returns the service's response.
    pub async fn remove(&self, params: Value) -> ModelResult<Value> {
        let id = self.require_id("remove")?;
        let payload = Payload::tuple([Payload::Id(id), Payload::Value(params)]);
        let removed = self.model.bridge().dispatch("remove", payload).await?;
        removed
            .into_value()
            .ok_or_else(|| ModelError::UnexpectedPayload("remove".to_string()))
    }

    fn wrap_response(&self, operation: &str, payload: Payload) -> ModelResult<Instance> {
        payload
            .into_entities()
            .and_then(|entities| entities.into_iter().next())
            .map(|entity| Instance::new(entity, self.model.clone()))
            .ok_or_else(|| ModelError::UnexpectedPayload(operation.to_string()))
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("is_clone", &self.is_clone())
            .field("record", &self.to_value())
            .finish()
    }
}
