//! Cache configuration.
//!
//! Options are set once at setup. Each collection state copies the ones it
//! needs when its service is registered.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// How a service namespace is derived from its path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameStyle {
    /// Last path segment: `api/v1/todos` → `todos`.
    #[default]
    Short,
    /// Whole path, trimmed of slashes: `/api/todos/` → `api/todos`.
    Path,
    /// Namespace must be given explicitly.
    Explicit,
}

impl NameStyle {
    /// Resolves the namespace for `service_path`. An explicit namespace
    /// always wins.
    pub fn namespace_for(
        self,
        service_path: &str,
        explicit: Option<&str>,
    ) -> Result<String, ConfigError> {
        if let Some(namespace) = explicit.filter(|ns| !ns.is_empty()) {
            return Ok(namespace.to_string());
        }
        let trimmed = service_path.trim_matches('/');
        match self {
            NameStyle::Short => Ok(trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()),
            NameStyle::Path => Ok(trimmed.to_string()),
            NameStyle::Explicit => Err(ConfigError::MissingNamespace(service_path.to_string())),
        }
    }
}

/// Global cache options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheOptions {
    /// Field holding the server-assigned id.
    pub id_field: String,
    /// Field holding the client-assigned temp id.
    pub temp_id_field: String,
    /// Remove stored records missing from a `find` response.
    pub auto_remove: bool,
    /// Add records arriving through `updateItem` when they are not stored yet.
    pub add_on_upsert: bool,
    /// Send only changed fields on patch.
    pub diff_on_patch: bool,
    pub enable_events: bool,
    /// Keep draft copies in observable state rather than beside it.
    pub keep_copies_in_store: bool,
    /// `save()` uses update instead of patch for existing records.
    pub prefer_update: bool,
    /// Incoming data replaces stored records instead of merging into them.
    pub replace_items: bool,
    pub server_alias: String,
    /// `get` answers from the store without a request when the id is cached.
    pub skip_request_if_exists: bool,
    /// Query keys only the server understands; ignored by the local `find`.
    pub params_for_server: Vec<String>,
    /// `$` operators the local `find` accepts.
    pub whitelist: Vec<String>,
    pub name_style: NameStyle,
    pub debug: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            temp_id_field: "__id".to_string(),
            auto_remove: false,
            add_on_upsert: false,
            diff_on_patch: true,
            enable_events: true,
            keep_copies_in_store: false,
            prefer_update: false,
            replace_items: false,
            server_alias: String::new(),
            skip_request_if_exists: false,
            params_for_server: Vec::new(),
            whitelist: Vec::new(),
            name_style: NameStyle::Short,
            debug: false,
        }
    }
}

impl CacheOptions {
    /// Options with defaults and the given alias.
    pub fn with_alias(server_alias: impl Into<String>) -> Self {
        Self {
            server_alias: server_alias.into(),
            ..Self::default()
        }
    }

    /// Parses options from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks the options that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_alias.is_empty() {
            return Err(ConfigError::MissingServerAlias);
        }
        if self.id_field.is_empty() {
            return Err(ConfigError::EmptyOption("idField"));
        }
        if self.temp_id_field.is_empty() {
            return Err(ConfigError::EmptyOption("tempIdField"));
        }
        Ok(())
    }
}
