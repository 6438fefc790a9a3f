//! Entity models.
//!
//! A [`BaseModel`] carries the cache options for one server alias. Each
//! service registered against it gets a [`Model`], the factory its
//! [`Instance`]s come from. Construction goes through [`Model::construct`],
//! which hands back the already-stored instance whenever the data carries an
//! id the store knows, so there is never more than one live record per id.

use crate::bridge::StoreBridge;
use crate::error::{ModelError, ModelResult};
use crate::instance::Instance;
use crate::registry::{ModelRegistry, WeakRegistry};
use entcache_record::{Entity, EntityRef, Record, Separated, merge_with_accessors, separate_accessors};
use entcache_store::{CacheOptions, Hydrator, Payload, Store, make_default_state};
use entcache_types::Id;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the default fields of a new instance. Defaults may contain
/// accessors.
pub type InstanceDefaults = Arc<dyn Fn() -> Record + Send + Sync>;

/// Per-call construction flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Build a draft: no dedupe, no commit, clone marker set for good.
    pub clone: bool,
    /// Add the new record to the collection.
    pub commit: bool,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            clone: false,
            commit: true,
        }
    }
}

impl InstanceOptions {
    pub fn uncommitted() -> Self {
        Self {
            commit: false,
            ..Self::default()
        }
    }

    pub fn draft() -> Self {
        Self {
            clone: true,
            ..Self::default()
        }
    }
}

/// Flags for wrappers that build on [`Model::construct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructionOptions {
    /// Merge the incoming data. Wrappers that merge on their own turn this off.
    pub merge: bool,
}

impl Default for ConstructionOptions {
    fn default() -> Self {
        Self { merge: true }
    }
}

/// Registration parameters for one backing service.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    pub service_path: String,
    /// Registry key; defaults to the namespace.
    pub model_name: Option<String>,
    /// Overrides the namespace derived from the path.
    pub namespace: Option<String>,
    pub instance_defaults: Option<InstanceDefaults>,
}

impl ServiceOptions {
    pub fn new(service_path: impl Into<String>) -> Self {
        Self {
            service_path: service_path.into(),
            ..Self::default()
        }
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn instance_defaults(mut self, defaults: impl Fn() -> Record + Send + Sync + 'static) -> Self {
        self.instance_defaults = Some(Arc::new(defaults));
        self
    }
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("service_path", &self.service_path)
            .field("model_name", &self.model_name)
            .field("namespace", &self.namespace)
            .field("instance_defaults", &self.instance_defaults.is_some())
            .finish()
    }
}

/// Builds the record for a new instance: defaults first (accessors, then
/// plain values), then `data` on top when `merge` is set.
pub(crate) fn initial_record(
    defaults: Option<&InstanceDefaults>,
    data: Record,
    merge: bool,
) -> Record {
    let mut record = Record::new();
    if let Some(defaults) = defaults {
        let Separated { accessors, values } = separate_accessors(&defaults());
        merge_with_accessors(&mut record, &accessors);
        merge_with_accessors(&mut record, &values);
    }
    if merge {
        merge_with_accessors(&mut record, &data);
    }
    record
}

/// Shared definition for every service model of one server alias.
#[derive(Debug)]
pub struct BaseModel {
    options: CacheOptions,
}

impl BaseModel {
    /// Returns the alias's base model, building it on first use. Later calls
    /// for the same alias get the existing base and their options are
    /// ignored.
    pub fn make(options: CacheOptions, registry: &ModelRegistry) -> ModelResult<Arc<BaseModel>> {
        options.validate()?;
        let alias = options.server_alias.clone();
        Ok(registry.base_or_insert_with(&alias, || {
            info!(server_alias = %alias, "Created base model");
            Arc::new(BaseModel { options })
        }))
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn server_alias(&self) -> &str {
        &self.options.server_alias
    }

    /// Registers a service: its collection state and hydrator with the
    /// store, its model with the registry.
    pub fn register_service(
        self: &Arc<Self>,
        registry: &ModelRegistry,
        store: Arc<dyn Store>,
        service: ServiceOptions,
    ) -> ModelResult<Model> {
        let options = &self.options;
        let namespace = options
            .name_style
            .namespace_for(&service.service_path, service.namespace.as_deref())?;
        let name = service.model_name.unwrap_or_else(|| namespace.clone());
        if registry.model(&options.server_alias, &name).is_some() {
            return Err(ModelError::DuplicateModel {
                alias: options.server_alias.clone(),
                name,
            });
        }

        let defaults = service.instance_defaults;
        let hydrate_defaults = defaults.clone();
        let hydrator: Hydrator =
            Arc::new(move |data| initial_record(hydrate_defaults.as_ref(), data, true));
        let state = make_default_state(&service.service_path, options);
        store.register_module(&namespace, state, Some(hydrator))?;

        let model = Model(Arc::new(ModelInner {
            base: self.clone(),
            name,
            service_path: service.service_path,
            bridge: StoreBridge::new(store, namespace, options.debug),
            instance_defaults: defaults,
            registry: registry.downgrade(),
        }));
        registry.insert_model(model.clone())?;
        info!(
            server_alias = %options.server_alias,
            model = %model.name(),
            namespace = %model.namespace(),
            "Registered service"
        );
        Ok(model)
    }
}

struct ModelInner {
    base: Arc<BaseModel>,
    name: String,
    service_path: String,
    bridge: StoreBridge,
    instance_defaults: Option<InstanceDefaults>,
    registry: WeakRegistry,
}

/// Factory and finder for one service's instances.
#[derive(Clone)]
pub struct Model(Arc<ModelInner>);

impl Model {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn namespace(&self) -> &str {
        self.0.bridge.namespace()
    }

    pub fn service_path(&self) -> &str {
        &self.0.service_path
    }

    pub fn base(&self) -> &Arc<BaseModel> {
        &self.0.base
    }

    pub fn options(&self) -> &CacheOptions {
        self.0.base.options()
    }

    pub(crate) fn bridge(&self) -> &StoreBridge {
        &self.0.bridge
    }

    /// The registry this model was registered in, while it is alive.
    pub fn models(&self) -> Option<ModelRegistry> {
        self.0.registry.upgrade()
    }

    /// Another model registered under the same alias.
    pub fn related(&self, name: &str) -> Option<Model> {
        self.models()?.model(self.base().server_alias(), name)
    }

    /// Effective id of `data`: the id field, else the temp id field.
    pub fn get_id(&self, data: &Record) -> Option<Id> {
        let options = self.options();
        data.effective_id(&options.id_field, &options.temp_id_field)
    }

    /// Shorthand for [`Model::construct`] with default options.
    pub fn instance(&self, data: Record) -> ModelResult<Instance> {
        self.construct(data, InstanceOptions::default(), ConstructionOptions::default())
    }

    /// Builds an instance from `data`.
    ///
    /// When `data` has an effective id already in the store (and this is not
    /// a draft), the stored instance is updated with `data` and returned in
    /// place of a new one.
    pub fn construct(
        &self,
        data: Record,
        instance: InstanceOptions,
        construction: ConstructionOptions,
    ) -> ModelResult<Instance> {
        if !instance.clone {
            if let Some(id) = self.get_id(&data) {
                if let Some(existing) = self.get_from_store(&id)? {
                    debug!(model = %self.name(), id = %id, "Construct resolved to stored instance");
                    self.0.bridge.commit("updateItem", Payload::Record(data))?;
                    return Ok(existing);
                }
            }
        }

        let record = initial_record(self.0.instance_defaults.as_ref(), data, construction.merge);
        let entity = if instance.clone {
            Entity::new_clone(record)
        } else {
            Entity::new(record)
        };
        if !instance.clone && instance.commit {
            self.0.bridge.commit("addItem", Payload::Entity(entity.clone()))?;
        }
        Ok(self.wrap(entity))
    }

    pub(crate) fn wrap(&self, entity: EntityRef) -> Instance {
        Instance::new(entity, self.clone())
    }

    fn wrap_one(&self, operation: &str, payload: Payload) -> ModelResult<Instance> {
        payload
            .into_entity()
            .map(|entity| self.wrap(entity))
            .ok_or_else(|| ModelError::UnexpectedPayload(operation.to_string()))
    }

    fn wrap_many(&self, operation: &str, payload: Payload) -> ModelResult<Vec<Instance>> {
        let entities = payload
            .into_entities()
            .ok_or_else(|| ModelError::UnexpectedPayload(operation.to_string()))?;
        Ok(entities.into_iter().map(|entity| self.wrap(entity)).collect())
    }

    /// Fetches matching records from the service and caches them.
    pub async fn find(&self, params: Value) -> ModelResult<Vec<Instance>> {
        let found = self.0.bridge.dispatch("find", Payload::Value(params)).await?;
        self.wrap_many("find", found)
    }

    /// Queries the cached records only.
    pub fn find_in_store(&self, params: Value) -> ModelResult<Vec<Instance>> {
        let found = self.0.bridge.getters("find", Some(Payload::Value(params)))?;
        self.wrap_many("find", found)
    }

    /// Fetches one record from the service and caches it.
    pub async fn get(&self, id: impl Into<Id>, params: Value) -> ModelResult<Instance> {
        let payload = Payload::tuple([Payload::Id(id.into()), Payload::Value(params)]);
        let got = self.0.bridge.dispatch("get", payload).await?;
        self.wrap_one("get", got)
    }

    pub fn get_from_store(&self, id: &Id) -> ModelResult<Option<Instance>> {
        let got = self.0.bridge.getters("get", Some(Payload::Id(id.clone())))?;
        Ok(got.into_entity().map(|entity| self.wrap(entity)))
    }

    /// Every cached instance, in insertion order.
    pub fn list(&self) -> ModelResult<Vec<Instance>> {
        let listed = self.0.bridge.getters("list", None)?;
        self.wrap_many("list", listed)
    }

    /// The draft kept in state for `id`. Only populated when copies are
    /// kept in the store.
    pub fn copy_by_id(&self, id: &Id) -> ModelResult<Option<Instance>> {
        let copy = self
            .0
            .bridge
            .getters("getCopyById", Some(Payload::Id(id.clone())))?;
        Ok(copy.into_entity().map(|entity| self.wrap(entity)))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.0.name)
            .field("service_path", &self.0.service_path)
            .field("namespace", &self.namespace())
            .finish_non_exhaustive()
    }
}
