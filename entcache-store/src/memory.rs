//! In-memory reference store.
//!
//! Holds one module per namespace: the observable [`CollectionState`], the
//! detached copy table used when copies are not kept in state, and the
//! hydrator for incoming records. Actions call out through a [`Transport`]
//! and never hold a module lock across an `.await`.
//!
//! Accessors, setters and the hydrator are caller code that may read the
//! store again. They never run under a module lock: locked sections return
//! [`Staged`] work that is finished once the guard is dropped.

use crate::error::{ServiceError, StoreError, StoreResult};
use crate::mutations::apply_update;
use crate::payload::Payload;
use crate::query::Query;
use crate::state::{CollectionState, Method};
use crate::store::{Hydrator, Store, split_address};
use crate::transport::Transport;
use async_trait::async_trait;
use entcache_record::{Entity, EntityRef, Record};
use entcache_types::Id;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, warn};

struct ServiceModule {
    state: CollectionState,
    detached_copies: HashMap<Id, EntityRef>,
    hydrator: Option<Hydrator>,
}

type SharedModule = Arc<Mutex<ServiceModule>>;

fn lock(module: &Mutex<ServiceModule>) -> MutexGuard<'_, ServiceModule> {
    module.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A record touched under the module lock, with caller code still to run.
#[must_use]
enum Staged {
    Ready(EntityRef),
    Merge {
        entity: EntityRef,
        data: Record,
        replace: bool,
    },
    Hydrate {
        entity: EntityRef,
        hydrator: Hydrator,
    },
}

impl Staged {
    /// Runs the deferred work. Call only after the module guard is dropped.
    fn finish(self) -> EntityRef {
        match self {
            Staged::Ready(entity) => entity,
            Staged::Merge {
                entity,
                data,
                replace,
            } => {
                apply_update(&entity, &data, replace);
                entity
            }
            Staged::Hydrate { entity, hydrator } => {
                let hydrated = hydrator(entity.snapshot());
                entity.replace(hydrated);
                entity
            }
        }
    }
}

fn finish_all(staged: Vec<Staged>) -> Vec<EntityRef> {
    staged.into_iter().map(Staged::finish).collect()
}

impl ServiceModule {
    /// Stores a new record; hydration is left to the caller.
    fn insert(&mut self, entity: EntityRef) -> Staged {
        self.state.add_item(entity.clone());
        match &self.hydrator {
            Some(hydrator) => Staged::Hydrate {
                entity,
                hydrator: hydrator.clone(),
            },
            None => Staged::Ready(entity),
        }
    }

    fn copies(&self) -> &HashMap<Id, EntityRef> {
        if self.state.keep_copies_in_store {
            &self.state.copies_by_id
        } else {
            &self.detached_copies
        }
    }

    fn copies_mut(&mut self) -> &mut HashMap<Id, EntityRef> {
        if self.state.keep_copies_in_store {
            &mut self.state.copies_by_id
        } else {
            &mut self.detached_copies
        }
    }

    /// Merges into the stored record, or adds a new one when `add_missing`.
    fn upsert(&mut self, record: Record, add_missing: bool) -> Option<Staged> {
        if let Some(entity) = self.state.locate(&record) {
            return Some(Staged::Merge {
                entity,
                data: record,
                replace: self.state.replace_items,
            });
        }
        if !add_missing {
            return None;
        }
        Some(self.insert(Entity::new(record)))
    }

    /// Upsert for server data, which must carry a canonical id.
    fn upsert_remote(&mut self, value: Value) -> StoreResult<(Id, Staged)> {
        let record = Record::from_value(value)?;
        let id = record
            .id(&self.state.id_field)
            .ok_or_else(|| StoreError::MissingId(self.state.id_field.clone()))?;
        let staged = self
            .upsert(record, true)
            .ok_or_else(|| StoreError::MissingId(self.state.id_field.clone()))?;
        Ok((id, staged))
    }

    fn query(&self, params: &Value) -> StoreResult<Query> {
        Query::from_params(params, &self.state.params_for_server, &self.state.whitelist)
    }

    fn create_copy(&mut self, id: &Id) -> StoreResult<EntityRef> {
        let original = self
            .state
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let copy = Entity::new_clone(original.snapshot());
        self.copies_mut().insert(id.clone(), copy.clone());
        Ok(copy)
    }

    fn reset_copy(&mut self, id: &Id) -> StoreResult<()> {
        let copy = self
            .copies()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::CopyNotFound(id.clone()))?;
        let original = self
            .state
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        copy.replace(original.snapshot());
        Ok(())
    }

    fn commit_copy(&mut self, id: &Id) -> StoreResult<Staged> {
        let copy = self
            .copies()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::CopyNotFound(id.clone()))?;
        let original = self
            .state
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(Staged::Merge {
            entity: original,
            data: copy.snapshot(),
            replace: false,
        })
    }

    fn promote(&mut self, temp: &Id, id: Id) -> StoreResult<EntityRef> {
        let entity = self.state.promote_temp_id(temp, id.clone())?;
        let id_field = self.state.id_field.clone();
        if let Some(copy) = self.copies_mut().remove(temp) {
            copy.write().insert(&id_field, id.to_value());
            self.copies_mut().insert(id, copy);
        }
        Ok(entity)
    }

    fn remove(&mut self, id: &Id) {
        self.state.remove_item(id);
        self.detached_copies.remove(id);
    }

    /// Applies a mutation. Merges and hydration land in `staged`.
    fn mutate(
        &mut self,
        name: &str,
        payload: Payload,
        staged: &mut Vec<Staged>,
    ) -> StoreResult<Payload> {
        match name {
            "addItem" => {
                let added = match payload {
                    Payload::Entity(entity) => {
                        self.state.add_item(entity.clone());
                        Staged::Ready(entity)
                    }
                    other => {
                        let record = other
                            .into_record()
                            .ok_or_else(|| invalid(name, "entity or record"))?;
                        self.insert(Entity::new(record))
                    }
                };
                staged.push(added);
                Ok(Payload::None)
            }
            "addItems" => {
                let entities = payload.into_entities().ok_or_else(|| invalid(name, "entities"))?;
                self.state.add_items(entities);
                Ok(Payload::None)
            }
            "updateItem" => {
                let record = payload.into_record().ok_or_else(|| invalid(name, "record"))?;
                let add_on_upsert = self.state.add_on_upsert;
                match self.upsert(record, add_on_upsert) {
                    Some(work) => staged.push(work),
                    None => debug!(service = %self.state.service_path, "updateItem for unknown id ignored"),
                }
                Ok(Payload::None)
            }
            "updateItems" => {
                let add_on_upsert = self.state.add_on_upsert;
                let mut ignored = 0;
                for item in payload.into_args() {
                    let record = item.into_record().ok_or_else(|| invalid(name, "records"))?;
                    match self.upsert(record, add_on_upsert) {
                        Some(work) => staged.push(work),
                        None => ignored += 1,
                    }
                }
                if ignored > 0 {
                    debug!(service = %self.state.service_path, ignored, "updateItems for unknown ids ignored");
                }
                Ok(Payload::None)
            }
            "removeItem" => {
                let id = payload.as_id().ok_or_else(|| invalid(name, "id"))?;
                self.remove(&id);
                Ok(Payload::None)
            }
            "removeItems" => {
                for item in payload.into_args() {
                    let id = item.as_id().ok_or_else(|| invalid(name, "ids"))?;
                    self.remove(&id);
                }
                Ok(Payload::None)
            }
            "clearAll" => {
                self.state.clear_all();
                self.detached_copies.clear();
                Ok(Payload::None)
            }
            "createCopy" => {
                let id = payload.as_id().ok_or_else(|| invalid(name, "id"))?;
                Ok(Payload::Entity(self.create_copy(&id)?))
            }
            "resetCopy" => {
                let id = payload.as_id().ok_or_else(|| invalid(name, "id"))?;
                self.reset_copy(&id)?;
                Ok(Payload::None)
            }
            "commitCopy" => {
                let id = payload.as_id().ok_or_else(|| invalid(name, "id"))?;
                staged.push(self.commit_copy(&id)?);
                Ok(Payload::None)
            }
            "clearCopy" => {
                let id = payload.as_id().ok_or_else(|| invalid(name, "id"))?;
                self.copies_mut().remove(&id);
                Ok(Payload::None)
            }
            "promoteTempId" => {
                let mut args = payload.into_args().into_iter();
                let (Some(temp), Some(id)) = (
                    args.next().and_then(|p| p.as_id()),
                    args.next().and_then(|p| p.as_id()),
                ) else {
                    return Err(invalid(name, "[tempId, id]"));
                };
                Ok(Payload::Entity(self.promote(&temp, id)?))
            }
            "setPending" | "unsetPending" => {
                let method = method_payload(name, payload)?;
                self.state.set_pending(method, name == "setPending");
                Ok(Payload::None)
            }
            "clearError" => {
                let method = method_payload(name, payload)?;
                self.state.set_error(method, None);
                Ok(Payload::None)
            }
            "setError" => {
                let mut args = payload.into_args().into_iter();
                let method = method_payload(name, args.next().unwrap_or_default())?;
                let error = args
                    .next()
                    .and_then(Payload::into_value)
                    .and_then(|v| serde_json::from_value::<ServiceError>(v).ok())
                    .ok_or_else(|| invalid(name, "[method, error]"))?;
                self.state.set_error(method, Some(error));
                Ok(Payload::None)
            }
            _ => Err(StoreError::UnknownMutation(name.to_string())),
        }
    }

    fn read(&self, name: &str, payload: Option<Payload>) -> StoreResult<Payload> {
        match (name, payload) {
            ("list", _) => Ok(Payload::Entities(self.state.list())),
            ("get", Some(payload)) => {
                let id = payload
                    .into_args()
                    .into_iter()
                    .next()
                    .and_then(|p| p.as_id())
                    .ok_or_else(|| invalid(name, "id or [id, params]"))?;
                Ok(self.state.get(&id).cloned().into())
            }
            ("getCopyById", Some(payload)) => {
                let id = payload.as_id().ok_or_else(|| invalid(name, "id"))?;
                Ok(self.state.copies_by_id.get(&id).cloned().into())
            }
            ("get" | "getCopyById", None) => Err(invalid(name, "a payload")),
            _ => Err(StoreError::UnknownGetter(name.to_string())),
        }
    }
}

fn invalid(operation: &str, expected: &'static str) -> StoreError {
    StoreError::InvalidPayload {
        operation: operation.to_string(),
        expected,
    }
}

fn method_payload(operation: &str, payload: Payload) -> StoreResult<Method> {
    payload
        .into_value()
        .and_then(|v| v.as_str().and_then(Method::from_name))
        .ok_or_else(|| invalid(operation, "method name"))
}

fn params_arg(payload: Option<Payload>) -> Value {
    payload.and_then(Payload::into_value).unwrap_or(Value::Null)
}

/// Records in a find response: a bare array or a page with `data`.
fn response_items(response: Value) -> Result<Vec<Value>, ServiceError> {
    match response {
        Value::Array(items) => Ok(items),
        Value::Object(mut page) => match page.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(malformed_page()),
        },
        _ => Err(malformed_page()),
    }
}

fn malformed_page() -> ServiceError {
    ServiceError::bad_response("find response is neither an array nor a page with data")
}

/// Filters `entities` through a local query.
fn matching(query: &Query, entities: Vec<(Id, EntityRef)>) -> StoreResult<Vec<(Id, EntityRef)>> {
    let mut found = Vec::new();
    for (id, entity) in entities {
        if query.matches(&entity.read())? {
            found.push((id, entity));
        }
    }
    Ok(found)
}

fn without_field(data: Value, field: &str) -> Value {
    match data {
        Value::Object(mut map) => {
            map.remove(field);
            Value::Object(map)
        }
        other => other,
    }
}

/// Fields of `data` that differ from the stored record.
fn diff_against(original: &Value, data: Value) -> Value {
    match data {
        Value::Object(map) => {
            let changed: Map<String, Value> = map
                .into_iter()
                .filter(|(key, value)| original.get(key) != Some(value))
                .collect();
            Value::Object(changed)
        }
        other => other,
    }
}

/// Reference [`Store`] keeping every namespace in memory.
pub struct MemoryStore {
    transport: Arc<dyn Transport>,
    modules: RwLock<HashMap<String, SharedModule>>,
}

impl MemoryStore {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            modules: RwLock::new(HashMap::new()),
        }
    }

    fn module(&self, namespace: &str) -> StoreResult<SharedModule> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))
    }

    /// Runs `f` against a namespace's current state.
    pub fn with_state<R>(
        &self,
        namespace: &str,
        f: impl FnOnce(&CollectionState) -> R,
    ) -> StoreResult<R> {
        let module = self.module(namespace)?;
        let guard = lock(&module);
        Ok(f(&guard.state))
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Marks `method` pending and returns the service path to call.
    fn begin(module: &SharedModule, method: Method) -> String {
        let mut guard = lock(module);
        guard.state.set_pending(method, true);
        guard.state.service_path.clone()
    }

    /// Unsets the pending flag and records the outcome in the error slot.
    fn settle<T>(
        guard: &mut ServiceModule,
        method: Method,
        result: Result<T, ServiceError>,
    ) -> StoreResult<T> {
        guard.state.set_pending(method, false);
        match result {
            Ok(value) => {
                guard.state.set_error(method, None);
                Ok(value)
            }
            Err(error) => {
                warn!(
                    service = %guard.state.service_path,
                    method = %method,
                    "Remote call failed: {}",
                    error
                );
                guard.state.set_error(method, Some(error.clone()));
                Err(StoreError::Service(error))
            }
        }
    }

    /// Local `find` getter. The query runs after the lock is released.
    fn find_in_store(module: &SharedModule, payload: Option<Payload>) -> StoreResult<Payload> {
        let params = params_arg(payload);
        let (query, entities) = {
            let guard = lock(module);
            let entities: Vec<(Id, EntityRef)> = guard
                .state
                .ids
                .iter()
                .filter_map(|id| Some((id.clone(), guard.state.get(id)?.clone())))
                .collect();
            (guard.query(&params)?, entities)
        };
        let found = matching(&query, entities)?;
        Ok(Payload::Entities(found.into_iter().map(|(_, entity)| entity).collect()))
    }

    async fn find(&self, module: SharedModule, payload: Payload) -> StoreResult<Payload> {
        let params = params_arg(Some(payload));
        let path = Self::begin(&module, Method::Find);
        let result = self
            .transport
            .find(&path, &params)
            .await
            .and_then(response_items);

        let (staged, auto_remove) = {
            let mut guard = lock(&module);
            let items = Self::settle(&mut guard, Method::Find, result)?;

            let mut staged = Vec::with_capacity(items.len());
            let mut returned = HashSet::new();
            for item in items {
                match guard.upsert_remote(item) {
                    Ok((id, work)) => {
                        returned.insert(id);
                        staged.push(work);
                    }
                    Err(e) => warn!(service = %path, "Skipping find result: {}", e),
                }
            }

            // Only records the same query would have matched are candidates.
            let auto_remove = if guard.state.auto_remove {
                match guard.query(&params) {
                    Ok(query) => {
                        let candidates: Vec<(Id, EntityRef)> = guard
                            .state
                            .ids
                            .iter()
                            .filter(|id| {
                                !returned.contains(*id) && !guard.state.temps_by_id.contains_key(*id)
                            })
                            .filter_map(|id| Some((id.clone(), guard.state.get(id)?.clone())))
                            .collect();
                        Some((query, candidates))
                    }
                    Err(e) => {
                        warn!(service = %path, "autoRemove skipped: {}", e);
                        None
                    }
                }
            } else {
                None
            };
            (staged, auto_remove)
        };
        let found = finish_all(staged);

        if let Some((query, candidates)) = auto_remove {
            let stale = matching(&query, candidates)?;
            debug!(service = %path, removed = stale.len(), "autoRemove");
            let mut guard = lock(&module);
            for (id, _) in &stale {
                guard.remove(id);
            }
        }
        Ok(Payload::Entities(found))
    }

    async fn get(&self, module: SharedModule, payload: Payload) -> StoreResult<Payload> {
        let mut args = payload.into_args().into_iter();
        let id = args
            .next()
            .and_then(|p| p.as_id())
            .ok_or_else(|| invalid("get", "id or [id, params]"))?;
        let params = params_arg(args.next());

        let path = {
            let mut guard = lock(&module);
            if guard.state.skip_request_if_exists {
                if let Some(existing) = guard.state.get(&id) {
                    debug!(id = %id, "get answered from store");
                    return Ok(Payload::Entity(existing.clone()));
                }
            }
            guard.state.set_pending(Method::Get, true);
            guard.state.service_path.clone()
        };
        let result = self.transport.get(&path, &id, &params).await;

        let (_, staged) = {
            let mut guard = lock(&module);
            let response = Self::settle(&mut guard, Method::Get, result)?;
            guard.upsert_remote(response)?
        };
        Ok(Payload::Entity(staged.finish()))
    }

    async fn create(&self, module: SharedModule, payload: Payload) -> StoreResult<Payload> {
        let mut args = payload.into_args().into_iter();
        let data = args
            .next()
            .and_then(Payload::into_value)
            .ok_or_else(|| invalid("create", "[data, params]"))?;
        let params = params_arg(args.next());

        let (path, id_field, temp_field) = {
            let mut guard = lock(&module);
            guard.state.set_pending(Method::Create, true);
            (
                guard.state.service_path.clone(),
                guard.state.id_field.clone(),
                guard.state.temp_id_field.clone(),
            )
        };
        let temp = data.get(&temp_field).and_then(Id::from_value);
        let wire = without_field(data, &temp_field);
        let result = self.transport.create(&path, &wire, &params).await;

        let mut guard = lock(&module);
        let response = Self::settle(&mut guard, Method::Create, result)?;

        if let Value::Array(items) = response {
            let mut staged = Vec::with_capacity(items.len());
            let mut failure = None;
            for item in items {
                match guard.upsert_remote(item) {
                    Ok((_, work)) => staged.push(work),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            drop(guard);
            let created = finish_all(staged);
            return match failure {
                Some(e) => Err(e),
                None => Ok(Payload::Entities(created)),
            };
        }

        let pending_temp = temp.filter(|t| guard.state.temps_by_id.contains_key(t));
        let staged = match pending_temp {
            Some(temp) => {
                let record = Record::from_value(response)?;
                let id = record
                    .id(&id_field)
                    .ok_or_else(|| StoreError::MissingId(id_field.clone()))?;
                Staged::Merge {
                    entity: guard.promote(&temp, id)?,
                    data: record,
                    replace: false,
                }
            }
            None => guard.upsert_remote(response)?.1,
        };
        drop(guard);
        Ok(Payload::Entity(staged.finish()))
    }

    /// Shared body of `update` and `patch`.
    ///
    /// A patch carrying a draft (or plain data) sends only the fields that
    /// differ from the stored original. A patch carrying the stored record
    /// itself has nothing to diff against and sends everything.
    async fn write(
        &self,
        module: SharedModule,
        method: Method,
        payload: Payload,
    ) -> StoreResult<Payload> {
        let mut args = payload.into_args().into_iter();
        let (Some(id), Some(data)) = (args.next().and_then(|p| p.as_id()), args.next()) else {
            return Err(invalid(method.as_str(), "[id, data, params]"));
        };
        let params = params_arg(args.next());
        let source = match &data {
            Payload::Entity(entity) => Some(entity.clone()),
            _ => None,
        };
        let data = data
            .into_value()
            .ok_or_else(|| invalid(method.as_str(), "[id, data, params]"))?;

        let (path, temp_field, original) = {
            let mut guard = lock(&module);
            guard.state.set_pending(method, true);
            let original = if method == Method::Patch && guard.state.diff_on_patch {
                guard.state.get(&id).cloned()
            } else {
                None
            };
            (
                guard.state.service_path.clone(),
                guard.state.temp_id_field.clone(),
                original,
            )
        };
        let mut data = without_field(data, &temp_field);
        let baseline = original.filter(|original| {
            !source
                .as_ref()
                .is_some_and(|source| Arc::ptr_eq(source, original))
        });
        if let Some(original) = baseline {
            data = diff_against(&original.to_value(), data);
        }

        let result = match method {
            Method::Update => self.transport.update(&path, &id, &data, &params).await,
            _ => self.transport.patch(&path, &id, &data, &params).await,
        };

        let (_, staged) = {
            let mut guard = lock(&module);
            let response = Self::settle(&mut guard, method, result)?;
            guard.upsert_remote(response)?
        };
        Ok(Payload::Entity(staged.finish()))
    }

    async fn remove(&self, module: SharedModule, payload: Payload) -> StoreResult<Payload> {
        let mut args = payload.into_args().into_iter();
        let id = args
            .next()
            .and_then(|p| p.as_id())
            .ok_or_else(|| invalid("remove", "id or [id, params]"))?;
        let params = params_arg(args.next());

        let path = Self::begin(&module, Method::Remove);
        let result = self.transport.remove(&path, &id, &params).await;

        let mut guard = lock(&module);
        let response = Self::settle(&mut guard, Method::Remove, result)?;
        guard.remove(&id);
        Ok(Payload::Value(response))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn register_module(
        &self,
        namespace: &str,
        state: CollectionState,
        hydrator: Option<Hydrator>,
    ) -> StoreResult<()> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(namespace) {
            return Err(StoreError::DuplicateNamespace(namespace.to_string()));
        }
        debug!(namespace = %namespace, service = %state.service_path, "Registered module");
        modules.insert(
            namespace.to_string(),
            Arc::new(Mutex::new(ServiceModule {
                state,
                detached_copies: HashMap::new(),
                hydrator,
            })),
        );
        Ok(())
    }

    fn getter(&self, address: &str, payload: Option<Payload>) -> StoreResult<Payload> {
        let (namespace, name) = split_address(address)?;
        let module = self.module(namespace)?;
        if name == "find" {
            return Self::find_in_store(&module, payload);
        }
        let guard = lock(&module);
        guard.read(name, payload)
    }

    fn commit(&self, address: &str, payload: Payload) -> StoreResult<Payload> {
        let (namespace, name) = split_address(address)?;
        let module = self.module(namespace)?;
        let mut staged = Vec::new();
        let result = lock(&module).mutate(name, payload, &mut staged);
        finish_all(staged);
        result
    }

    async fn dispatch(&self, address: &str, payload: Payload) -> StoreResult<Payload> {
        let (namespace, name) = split_address(address)?;
        let module = self.module(namespace)?;
        debug!(namespace = %namespace, action = %name, "Dispatching action");
        match name {
            "find" => self.find(module, payload).await,
            "get" => self.get(module, payload).await,
            "create" => self.create(module, payload).await,
            "update" => self.write(module, Method::Update, payload).await,
            "patch" => self.write(module, Method::Patch, payload).await,
            "remove" => self.remove(module, payload).await,
            _ => Err(StoreError::UnknownAction(name.to_string())),
        }
    }
}
