//! Normalized collection state and the store contract for entcache.
//!
//! # Architecture
//!
//! - [`CollectionState`] is the per-service state shape: ordered `ids`,
//!   `keyed_by_id`, `copies_by_id`, `temps_by_id`, per-method pending flags
//!   and error slots, plus the configuration it was built with
//! - [`Store`] is the addressing contract (`"<namespace>/<name>"`) the model
//!   layer drives: synchronous getters and mutations, asynchronous actions
//! - [`Transport`] is the remote service client actions call out to
//! - [`MemoryStore`] is the reference [`Store`]: it owns the states and is
//!   the only writer to them
//!
//! Execution is cooperative. Two actions of the same kind can interleave at
//! their `.await`; the pending flag and error slot then reflect whichever
//! settled last. Callers that need per-call outcomes use the returned result.

mod config;
mod error;
mod memory;
mod mutations;
mod payload;
pub mod query;
mod state;
mod store;
mod transport;

pub use config::{CacheOptions, NameStyle};
pub use error::{ConfigError, ServiceError, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use payload::Payload;
pub use state::{CollectionState, Method, make_default_state};
pub use store::{Hydrator, Store, split_address};
pub use transport::Transport;
