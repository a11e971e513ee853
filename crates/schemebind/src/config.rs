// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Service configuration.

use crate::error::Result;
use crate::store::{BindingStore, DocumentBindingStore, KvBindingStore, SqliteBindingStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Which storage backend to open
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Relational driver (SQLite file)
    Sqlite {
        /// Database file path
        path: String,
    },
    /// Document driver (JSON document directory)
    Document {
        /// Document root directory
        dir: String,
    },
    /// Key-value driver (redb file)
    KeyValue {
        /// Database file path
        path: String,
    },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Sqlite {
            path: "schemebind.db".to_string(),
        }
    }
}

/// Registry service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend selection
    pub store: StoreBackend,

    /// Change notification channel capacity
    pub notify_capacity: usize,

    /// Instance name used in logs
    pub instance_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreBackend::default(),
            notify_capacity: 64,
            instance_name: "SchemeBindService".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Open the configured storage backend
    pub fn open_store(&self) -> Result<Arc<dyn BindingStore>> {
        Ok(match &self.store {
            StoreBackend::Sqlite { path } => Arc::new(SqliteBindingStore::new(path)?),
            StoreBackend::Document { dir } => Arc::new(DocumentBindingStore::new(dir)?),
            StoreBackend::KeyValue { path } => Arc::new(KvBindingStore::new(path)?),
        })
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    store: Option<StoreBackend>,
    notify_capacity: Option<usize>,
    instance_name: Option<String>,
}

impl ConfigBuilder {
    /// Set the storage backend
    pub fn store(mut self, store: StoreBackend) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the change notification channel capacity
    pub fn notify_capacity(mut self, capacity: usize) -> Self {
        self.notify_capacity = Some(capacity);
        self
    }

    /// Set the instance name used in logs
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            store: self.store.unwrap_or(defaults.store),
            notify_capacity: self.notify_capacity.unwrap_or(defaults.notify_capacity),
            instance_name: self.instance_name.unwrap_or(defaults.instance_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .store(StoreBackend::KeyValue {
                path: "bindings.redb".to_string(),
            })
            .notify_capacity(128)
            .instance_name("node-a")
            .build();

        assert!(matches!(config.store, StoreBackend::KeyValue { .. }));
        assert_eq!(config.notify_capacity, 128);
        assert_eq!(config.instance_name, "node-a");
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(matches!(config.store, StoreBackend::Sqlite { .. }));
        assert_eq!(config.notify_capacity, 64);
    }

    #[test]
    fn test_config_from_toml() {
        let text = r#"
            instance_name = "node-b"

            [store]
            backend = "document"
            dir = "/var/lib/schemebind/docs"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.instance_name, "node-b");
        assert!(matches!(config.store, StoreBackend::Document { .. }));
    }
}
