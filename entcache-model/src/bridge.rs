//! Store bridge.
//!
//! Maps a verb plus payload onto the namespaced store operation
//! `"<namespace>/<verb>"`.

use entcache_store::{Payload, Store, StoreResult};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct StoreBridge {
    store: Arc<dyn Store>,
    namespace: String,
    debug: bool,
}

impl StoreBridge {
    pub fn new(store: Arc<dyn Store>, namespace: impl Into<String>, debug: bool) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            debug,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn address(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }

    /// Reads a getter. With a payload the getter is evaluated for it,
    /// otherwise its plain value comes back.
    pub fn getters(&self, name: &str, payload: Option<Payload>) -> StoreResult<Payload> {
        let address = self.address(name);
        if self.debug {
            debug!(address = %address, parameterized = payload.is_some(), "getter");
        }
        self.store.getter(&address, payload)
    }

    /// Applies a mutation.
    pub fn commit(&self, name: &str, payload: Payload) -> StoreResult<Payload> {
        let address = self.address(name);
        if self.debug {
            debug!(address = %address, "commit");
        }
        self.store.commit(&address, payload)
    }

    /// Runs an action.
    pub async fn dispatch(&self, name: &str, payload: Payload) -> StoreResult<Payload> {
        let address = self.address(name);
        if self.debug {
            debug!(address = %address, "dispatch");
        }
        self.store.dispatch(&address, payload).await
    }
}

impl std::fmt::Debug for StoreBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBridge")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
