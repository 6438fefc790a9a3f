//! Entity models for entcache.
//!
//! Sits on top of the store contract:
//! - [`EntityCache`]: setup entry point; validates options and registers
//!   services
//! - [`Model`]: per-service factory with id dedupe, finders and store reads
//! - [`Instance`]: a cached record with draft editing (`clone`, `reset`,
//!   `commit`) and remote writes (`save`, `create`, `patch`, `update`,
//!   `remove`)
//! - [`ModelRegistry`]: alias-keyed table of base and service models
//! - [`StoreBridge`]: addresses store calls as `"<namespace>/<name>"`
//!
//! # Example
//!
//! ```ignore
//! let cache = EntityCache::builder(CacheOptions::with_alias("api"))
//!     .transport(transport)
//!     .build()?;
//! let todos = cache.service(ServiceOptions::new("todos"))?;
//!
//! let todo = todos.instance(Record::new().with("title", "write docs"))?;
//! let saved = todo.save(json!({})).await?;
//! let draft = saved.clone()?;
//! draft.set("title", "write better docs")?;
//! draft.commit()?;
//! ```

mod bridge;
mod error;
mod instance;
mod model;
mod registry;
mod setup;

pub use bridge::StoreBridge;
pub use error::{ModelError, ModelResult};
pub use instance::Instance;
pub use model::{
    BaseModel, ConstructionOptions, InstanceDefaults, InstanceOptions, Model, ServiceOptions,
};
pub use registry::ModelRegistry;
pub use setup::{EntityCache, EntityCacheBuilder};

pub use entcache_record::{Accessor, Record};
pub use entcache_store::{CacheOptions, NameStyle, Payload, ServiceError, Transport};
pub use entcache_types::Id;
