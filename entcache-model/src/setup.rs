//! Cache setup.
//!
//! [`EntityCache`] is the entry point: it checks the options, resolves the
//! base model for the alias and hands out service models.

use crate::error::{ModelError, ModelResult};
use crate::model::{BaseModel, Model, ServiceOptions};
use crate::registry::ModelRegistry;
use entcache_store::{CacheOptions, MemoryStore, Store, Transport};
use std::sync::Arc;
use tracing::{info, warn};

pub struct EntityCache {
    base: Arc<BaseModel>,
    store: Arc<dyn Store>,
    registry: ModelRegistry,
}

pub struct EntityCacheBuilder {
    options: CacheOptions,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn Store>>,
    registry: Option<ModelRegistry>,
}

impl EntityCacheBuilder {
    /// Backs the cache with a [`MemoryStore`] over this transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses an existing store. Takes precedence over [`Self::transport`].
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Shares a registry between caches. A fresh one is used otherwise.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> ModelResult<EntityCache> {
        let store: Arc<dyn Store> = match (self.store, self.transport) {
            (Some(store), _) => store,
            (None, Some(transport)) => Arc::new(MemoryStore::new(transport)),
            (None, None) => {
                warn!("Cache setup without a transport or store");
                return Err(ModelError::MissingClient);
            }
        };
        if let Err(e) = self.options.validate() {
            warn!("Invalid cache options: {}", e);
            return Err(e.into());
        }
        let registry = self.registry.unwrap_or_default();
        let base = BaseModel::make(self.options, &registry)?;
        info!(server_alias = %base.server_alias(), "Entity cache ready");
        Ok(EntityCache {
            base,
            store,
            registry,
        })
    }
}

impl EntityCache {
    pub fn builder(options: CacheOptions) -> EntityCacheBuilder {
        EntityCacheBuilder {
            options,
            transport: None,
            store: None,
            registry: None,
        }
    }

    /// Registers a backing service and returns its model.
    pub fn service(&self, service: ServiceOptions) -> ModelResult<Model> {
        self.base
            .register_service(&self.registry, self.store.clone(), service)
    }

    pub fn base_model(&self) -> &Arc<BaseModel> {
        &self.base
    }

    pub fn options(&self) -> &CacheOptions {
        self.base.options()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// A model registered under this cache's alias.
    pub fn model(&self, name: &str) -> Option<Model> {
        self.registry.model(self.base.server_alias(), name)
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("server_alias", &self.base.server_alias())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
