//! Shared test helpers for model tests.

#![allow(dead_code)]

use async_trait::async_trait;
use entcache_model::{CacheOptions, EntityCache, Id, ServiceError, Transport};
use entcache_store::MemoryStore;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; `RUST_LOG` controls the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One transport call: method name, id (if any) and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub id: Option<Id>,
    pub data: Value,
}

/// Scripted service: keeps records by numeric id, logs every call, and can
/// fail or hold the next call.
#[derive(Default)]
pub struct MockTransport {
    records: Mutex<BTreeMap<i64, Value>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<Call>>,
    fail_next: Mutex<Option<ServiceError>>,
    hold: AtomicBool,
    gate: Notify,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, records: Vec<Value>) {
        let mut stored = self.records.lock().unwrap();
        for record in records {
            let id = record["id"].as_i64().unwrap();
            self.next_id.fetch_max(id, Ordering::SeqCst);
            stored.insert(id, record);
        }
    }

    /// Makes the next id handed out by `create` equal `id`.
    pub fn next_id_will_be(&self, id: i64) {
        self.next_id.store(id - 1, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|call| call.method).collect()
    }

    pub fn fail_next(&self, error: ServiceError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Parks every following call until [`Self::release`].
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    async fn enter(&self, method: &'static str, id: Option<&Id>, data: &Value) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(Call {
            method,
            id: id.cloned(),
            data: data.clone(),
        });
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn key(id: &Id) -> i64 {
        match id {
            Id::Num(n) => *n,
            Id::Str(s) => s.parse().unwrap_or(-1),
        }
    }

    fn stored(&self, id: &Id) -> Result<Value, ServiceError> {
        self.records
            .lock()
            .unwrap()
            .get(&Self::key(id))
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("no record {id}")))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn find(&self, _path: &str, params: &Value) -> Result<Value, ServiceError> {
        self.enter("find", None, params).await?;
        let records: Vec<Value> = self.records.lock().unwrap().values().cloned().collect();
        Ok(Value::Array(records))
    }

    async fn get(&self, _path: &str, id: &Id, params: &Value) -> Result<Value, ServiceError> {
        self.enter("get", Some(id), params).await?;
        self.stored(id)
    }

    async fn create(&self, _path: &str, data: &Value, _params: &Value) -> Result<Value, ServiceError> {
        self.enter("create", None, data).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut record = data.clone();
        record["id"] = json!(id);
        self.records.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, _path: &str, id: &Id, data: &Value, _params: &Value) -> Result<Value, ServiceError> {
        self.enter("update", Some(id), data).await?;
        let mut record = data.clone();
        record["id"] = id.to_value();
        self.records.lock().unwrap().insert(Self::key(id), record.clone());
        Ok(record)
    }

    async fn patch(&self, _path: &str, id: &Id, data: &Value, _params: &Value) -> Result<Value, ServiceError> {
        self.enter("patch", Some(id), data).await?;
        let mut record = self.stored(id)?;
        if let (Some(target), Some(changes)) = (record.as_object_mut(), data.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        self.records.lock().unwrap().insert(Self::key(id), record.clone());
        Ok(record)
    }

    async fn remove(&self, _path: &str, id: &Id, params: &Value) -> Result<Value, ServiceError> {
        self.enter("remove", Some(id), params).await?;
        let removed = self.stored(id)?;
        self.records.lock().unwrap().remove(&Self::key(id));
        Ok(removed)
    }
}

/// A cache over a fresh [`MemoryStore`] and [`MockTransport`].
pub struct Harness {
    pub cache: EntityCache,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<MockTransport>,
}

pub fn harness(options: CacheOptions) -> Harness {
    init_tracing();
    let transport = MockTransport::new();
    let store = Arc::new(MemoryStore::new(transport.clone()));
    let cache = EntityCache::builder(options)
        .store(store.clone())
        .build()
        .unwrap();
    Harness {
        cache,
        store,
        transport,
    }
}

pub fn options() -> CacheOptions {
    CacheOptions::with_alias("api")
}
