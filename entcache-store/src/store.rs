//! The store contract the model layer talks to.
//!
//! Every operation is addressed as `"<namespace>/<name>"`. Getters and
//! mutations are synchronous; actions are asynchronous and may reach the
//! network.

use crate::error::{StoreError, StoreResult};
use crate::payload::Payload;
use crate::state::CollectionState;
use async_trait::async_trait;
use entcache_record::Record;
use std::sync::Arc;

/// Turns raw record data into the record that gets stored, e.g. by layering
/// the model's instance defaults under it.
pub type Hydrator = Arc<dyn Fn(Record) -> Record + Send + Sync>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Registers a service's state under `namespace`.
    fn register_module(
        &self,
        namespace: &str,
        state: CollectionState,
        hydrator: Option<Hydrator>,
    ) -> StoreResult<()>;

    /// Reads a getter. With a payload the getter is evaluated for that
    /// payload; without one its plain value is returned.
    fn getter(&self, address: &str, payload: Option<Payload>) -> StoreResult<Payload>;

    /// Applies a mutation. Most mutations return [`Payload::None`];
    /// `createCopy` returns the copy it made.
    fn commit(&self, address: &str, payload: Payload) -> StoreResult<Payload>;

    /// Runs an action to completion.
    async fn dispatch(&self, address: &str, payload: Payload) -> StoreResult<Payload>;
}

/// Splits `"<namespace>/<name>"`. The namespace itself may contain slashes.
pub fn split_address(address: &str) -> StoreResult<(&str, &str)> {
    match address.rsplit_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace, name))
        }
        _ => Err(StoreError::MalformedAddress(address.to_string())),
    }
}
