//! Model registry.
//!
//! One table per process (or per test), keyed by server alias. Each alias
//! owns exactly one [`BaseModel`] and any number of service models, so
//! related models can find each other by name instead of by import order.

use crate::error::{ModelError, ModelResult};
use crate::model::{BaseModel, Model};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::debug;

struct AliasModels {
    base: Arc<BaseModel>,
    models: BTreeMap<String, Model>,
}

type Table = RwLock<HashMap<String, AliasModels>>;

#[derive(Clone, Default)]
pub struct ModelRegistry {
    inner: Arc<Table>,
}

/// Non-owning registry handle held by models, so the registry → model →
/// registry loop does not keep the table alive forever.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry(Weak<Table>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<ModelRegistry> {
        self.0.upgrade().map(|inner| ModelRegistry { inner })
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_model(&self, alias: &str) -> Option<Arc<BaseModel>> {
        self.read().get(alias).map(|entry| entry.base.clone())
    }

    pub fn model(&self, alias: &str, name: &str) -> Option<Model> {
        self.read()
            .get(alias)
            .and_then(|entry| entry.models.get(name).cloned())
    }

    /// Names of the models registered for `alias`, sorted.
    pub fn model_names(&self, alias: &str) -> Vec<String> {
        self.read()
            .get(alias)
            .map(|entry| entry.models.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Returns the alias's base model, creating it with `make` on first use.
    pub(crate) fn base_or_insert_with(
        &self,
        alias: &str,
        make: impl FnOnce() -> Arc<BaseModel>,
    ) -> Arc<BaseModel> {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = table.get(alias) {
            debug!(server_alias = %alias, "Reusing existing base model");
            return entry.base.clone();
        }
        let base = make();
        table.insert(
            alias.to_string(),
            AliasModels {
                base: base.clone(),
                models: BTreeMap::new(),
            },
        );
        base
    }

    /// Registers a service model under its name. Each name is taken once
    /// per alias.
    pub(crate) fn insert_model(&self, model: Model) -> ModelResult<()> {
        let alias = model.base().options().server_alias.clone();
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = table.entry(alias.clone()).or_insert_with(|| AliasModels {
            base: model.base().clone(),
            models: BTreeMap::new(),
        });
        if entry.models.contains_key(model.name()) {
            return Err(ModelError::DuplicateModel {
                alias,
                name: model.name().to_string(),
            });
        }
        debug!(server_alias = %alias, model = %model.name(), "Registered model");
        entry.models.insert(model.name().to_string(), model);
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, AliasModels>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("aliases", &self.aliases())
            .finish()
    }
}
