// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! SchemeBind - dynamic protocol scheme binding registry
//!
//! Lets a running service register, update, and remove named protocol
//! handler bindings (scheme name -> handler type + options) without a
//! restart, durably, against one of three interchangeable storage
//! backends with optimistic concurrency.
//!
//! # Features
//!
//! - **Live dispatch mirror** -- per-scheme atomic swaps, lock-free reads
//! - **Three storage drivers** -- SQLite (relational), JSON documents,
//!   redb (key-value), one shared contract
//! - **Optimistic concurrency** -- per-scheme token checks, exactly one
//!   concurrent writer wins, losers reload and retry
//! - **Typed options payloads** -- closed managed-type catalog, strict or
//!   full payload modes
//! - **Change notification** -- idempotent cross-instance fan-out
//!
//! # Architecture
//!
//! ```text
//! RegistryService
//! +-- SchemeRegistry   (live dispatch mirror + config cache)
//! +-- BindingStore     (SQLite, document, or key-value driver)
//! +-- ChangeNotifier   (publishes {scheme, kind} to other instances)
//! +-- ChangeListener   (re-reads store, re-applies locally)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use schemebind::{Binding, Config, RegistryService, TypeIdentity};
//! use schemebind::handlers::{default_catalog, OAuthOptions};
//!
//! let config = Config::builder().build();
//! let service = RegistryService::new(config, default_catalog())?;
//! service.load(&cancel).await?;
//!
//! let binding = Binding::new(
//!     "github",
//!     "GitHub",
//!     TypeIdentity::new("OAuthHandler"),
//!     OAuthOptions { client_id: "abc".into(), ..Default::default() },
//! );
//! service.registry().add(&binding, &cancel).await?;
//! ```

pub mod binding;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod options;
pub mod registry;
pub mod store;
pub mod typeid;

pub use binding::{validate_scheme, Binding, BindingRecord, ConcurrencyToken};
pub use catalog::{ErasedOptions, HandlerDescriptor, HandlerOptions, TypeCatalog, TypeCatalogBuilder};
pub use config::{Config, ConfigBuilder, ConfigError, StoreBackend};
pub use error::{BindingError, Result};
pub use notify::{BindingChange, ChangeKind, ChangeListener, ChangeNotifier};
pub use options::{CertificateData, CodecMode, OptionsCodec, TypeDefaultsCache};
pub use registry::{LiveBinding, SchemeRegistry};
pub use store::{
    BindingStore, DocumentBindingStore, KvBindingStore, SqliteBindingStore,
};
pub use typeid::{TypeCodec, TypeIdentity};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Registry service
///
/// Composes the configured store, the live registry, and the change
/// notifier into one unit with a run loop.
pub struct RegistryService {
    config: Config,
    registry: Arc<SchemeRegistry>,
    notifier: ChangeNotifier,
}

impl RegistryService {
    /// Create a service from configuration and a managed type catalog
    pub fn new(config: Config, catalog: TypeCatalog) -> Result<Self> {
        let store = config.open_store()?;
        let notifier = ChangeNotifier::new(config.notify_capacity);
        let registry = Arc::new(
            SchemeRegistry::new(store, Arc::new(catalog)).with_notifier(notifier.clone()),
        );
        Ok(Self {
            config,
            registry,
            notifier,
        })
    }

    /// The live registry
    pub fn registry(&self) -> Arc<SchemeRegistry> {
        Arc::clone(&self.registry)
    }

    /// The change notifier; bridge a transport by publishing received
    /// remote events into it
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// The service configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bulk-load stored bindings into the live registry
    pub async fn load(&self, cancel: &CancellationToken) -> Result<usize> {
        self.registry.load(cancel).await
    }

    /// Run until cancelled: load the registry, then keep a change
    /// listener applying published events to live state.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            instance = %self.config.instance_name,
            "starting scheme binding registry"
        );

        let loaded = self.load(&cancel).await?;
        tracing::info!(count = loaded, "bindings loaded");
        for scheme in self.registry.schemes() {
            tracing::info!(scheme, "bound");
        }

        let listener = ChangeListener::new(Arc::clone(&self.registry), self.notifier.subscribe());
        let listener_handle = tokio::spawn(listener.run(cancel.clone()));

        cancel.cancelled().await;
        let _ = listener_handle.await;
        tracing::info!("scheme binding registry stopped");
        Ok(())
    }
}
