//! Normalized collection state.
//!
//! One [`CollectionState`] exists per registered service. Records are stored
//! once, in `keyed_by_id`, and `ids` keeps their insertion order.

use crate::config::CacheOptions;
use crate::error::ServiceError;
use entcache_record::EntityRef;
use entcache_types::Id;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The remote operations whose progress the state tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Find,
        Method::Get,
        Method::Create,
        Method::Update,
        Method::Patch,
        Method::Remove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::Get => "get",
            Method::Create => "create",
            Method::Update => "update",
            Method::Patch => "patch",
            Method::Remove => "remove",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Method::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical per-service state.
///
/// Invariant: `ids` and the key set of `keyed_by_id` hold the same ids, each
/// exactly once. Pending flags are booleans, not counters: with two calls of
/// the same kind in flight, whichever settles last decides the flag.
#[derive(Debug, Clone)]
pub struct CollectionState {
    pub ids: Vec<Id>,
    pub keyed_by_id: HashMap<Id, EntityRef>,
    pub copies_by_id: HashMap<Id, EntityRef>,
    pub temps_by_id: HashMap<Id, EntityRef>,

    pub service_path: String,
    pub id_field: String,
    pub temp_id_field: String,
    pub server_alias: String,
    pub auto_remove: bool,
    pub enable_events: bool,
    pub add_on_upsert: bool,
    pub diff_on_patch: bool,
    pub keep_copies_in_store: bool,
    pub skip_request_if_exists: bool,
    pub prefer_update: bool,
    pub replace_items: bool,
    pub params_for_server: Vec<String>,
    pub whitelist: Vec<String>,

    pub is_find_pending: bool,
    pub is_get_pending: bool,
    pub is_create_pending: bool,
    pub is_update_pending: bool,
    pub is_patch_pending: bool,
    pub is_remove_pending: bool,

    pub error_on_find: Option<ServiceError>,
    pub error_on_get: Option<ServiceError>,
    pub error_on_create: Option<ServiceError>,
    pub error_on_update: Option<ServiceError>,
    pub error_on_patch: Option<ServiceError>,
    pub error_on_remove: Option<ServiceError>,
}

/// Builds the empty initial state for a service.
pub fn make_default_state(service_path: &str, options: &CacheOptions) -> CollectionState {
    CollectionState {
        ids: Vec::new(),
        keyed_by_id: HashMap::new(),
        copies_by_id: HashMap::new(),
        temps_by_id: HashMap::new(),

        service_path: service_path.to_string(),
        id_field: options.id_field.clone(),
        temp_id_field: options.temp_id_field.clone(),
        server_alias: options.server_alias.clone(),
        auto_remove: options.auto_remove,
        enable_events: options.enable_events,
        add_on_upsert: options.add_on_upsert,
        diff_on_patch: options.diff_on_patch,
        keep_copies_in_store: options.keep_copies_in_store,
        skip_request_if_exists: options.skip_request_if_exists,
        prefer_update: options.prefer_update,
        replace_items: options.replace_items,
        params_for_server: options.params_for_server.clone(),
        whitelist: options.whitelist.clone(),

        is_find_pending: false,
        is_get_pending: false,
        is_create_pending: false,
        is_update_pending: false,
        is_patch_pending: false,
        is_remove_pending: false,

        error_on_find: None,
        error_on_get: None,
        error_on_create: None,
        error_on_update: None,
        error_on_patch: None,
        error_on_remove: None,
    }
}

impl CollectionState {
    pub fn is_pending(&self, method: Method) -> bool {
        match method {
            Method::Find => self.is_find_pending,
            Method::Get => self.is_get_pending,
            Method::Create => self.is_create_pending,
            Method::Update => self.is_update_pending,
            Method::Patch => self.is_patch_pending,
            Method::Remove => self.is_remove_pending,
        }
    }

    pub fn set_pending(&mut self, method: Method, pending: bool) {
        let flag = match method {
            Method::Find => &mut self.is_find_pending,
            Method::Get => &mut self.is_get_pending,
            Method::Create => &mut self.is_create_pending,
            Method::Update => &mut self.is_update_pending,
            Method::Patch => &mut self.is_patch_pending,
            Method::Remove => &mut self.is_remove_pending,
        };
        *flag = pending;
    }

    pub fn error_on(&self, method: Method) -> Option<&ServiceError> {
        match method {
            Method::Find => self.error_on_find.as_ref(),
            Method::Get => self.error_on_get.as_ref(),
            Method::Create => self.error_on_create.as_ref(),
            Method::Update => self.error_on_update.as_ref(),
            Method::Patch => self.error_on_patch.as_ref(),
            Method::Remove => self.error_on_remove.as_ref(),
        }
    }

    pub fn set_error(&mut self, method: Method, error: Option<ServiceError>) {
        let slot = match method {
            Method::Find => &mut self.error_on_find,
            Method::Get => &mut self.error_on_get,
            Method::Create => &mut self.error_on_create,
            Method::Update => &mut self.error_on_update,
            Method::Patch => &mut self.error_on_patch,
            Method::Remove => &mut self.error_on_remove,
        };
        *slot = error;
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, id: &Id) -> Option<&EntityRef> {
        self.keyed_by_id.get(id)
    }

    /// Stored records in `ids` order.
    pub fn list(&self) -> Vec<EntityRef> {
        self.ids
            .iter()
            .filter_map(|id| self.keyed_by_id.get(id).cloned())
            .collect()
    }

    /// Whether `ids` and `keyed_by_id` agree and `ids` has no duplicates.
    pub fn is_consistent(&self) -> bool {
        let unique: HashSet<&Id> = self.ids.iter().collect();
        unique.len() == self.ids.len()
            && unique.len() == self.keyed_by_id.len()
            && self.ids.iter().all(|id| self.keyed_by_id.contains_key(id))
    }
}
