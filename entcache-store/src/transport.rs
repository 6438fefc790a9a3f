//! The service client contract.
//!
//! The store never talks to the network itself; every remote call goes
//! through a [`Transport`]. Retries, timeouts and authentication are the
//! transport's business.

use crate::error::ServiceError;
use async_trait::async_trait;
use entcache_types::Id;
use serde_json::Value;

/// A client for a remote service API, addressed by service path.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns an array of records or a page object with a `data` array.
    async fn find(&self, service_path: &str, params: &Value) -> Result<Value, ServiceError>;

    async fn get(&self, service_path: &str, id: &Id, params: &Value)
    -> Result<Value, ServiceError>;

    async fn create(
        &self,
        service_path: &str,
        data: &Value,
        params: &Value,
    ) -> Result<Value, ServiceError>;

    async fn update(
        &self,
        service_path: &str,
        id: &Id,
        data: &Value,
        params: &Value,
    ) -> Result<Value, ServiceError>;

    async fn patch(
        &self,
        service_path: &str,
        id: &Id,
        data: &Value,
        params: &Value,
    ) -> Result<Value, ServiceError>;

    async fn remove(
        &self,
        service_path: &str,
        id: &Id,
        params: &Value,
    ) -> Result<Value, ServiceError>;
}
