// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Live dispatch mirror.
//!
//! [`SchemeRegistry`] mirrors durable bindings into an in-memory dispatch
//! table the request pipeline reads on every call. The store is always
//! the source of truth: every mutation persists first and only touches
//! live state after the store accepted the write. Each scheme's handler
//! type and options instance live in one `Arc`, and swapping an entry is
//! a single map insert, so concurrent readers can never observe a new
//! handler type paired with old options or vice versa.

use crate::binding::{validate_scheme, Binding, BindingRecord, ConcurrencyToken};
use crate::catalog::{ErasedOptions, TypeCatalog};
use crate::error::{BindingError, Result};
use crate::notify::{BindingChange, ChangeKind, ChangeNotifier};
use crate::options::OptionsCodec;
use crate::store::BindingStore;
use crate::typeid::{TypeCodec, TypeIdentity};
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One bound scheme as exposed to the dispatch pipeline: the handler
/// type, its options instance, and the display name, plus the token of
/// the store state this entry mirrors.
pub struct LiveBinding {
    /// Scheme name
    pub scheme: String,
    /// Human-readable name
    pub display_name: String,
    /// Handler type that processes requests for this scheme
    pub handler_type: TypeIdentity,
    /// Materialized options instance (cached configuration)
    pub options: ErasedOptions,
    /// Store token this live entry corresponds to
    pub token: ConcurrencyToken,
}

impl LiveBinding {
    /// Borrow the options as their concrete type, if it matches
    pub fn options_as<O: 'static>(&self) -> Option<&O> {
        self.options.downcast_ref::<O>()
    }
}

/// In-memory registry of bound schemes, mirroring a [`BindingStore`].
pub struct SchemeRegistry {
    store: Arc<dyn BindingStore>,
    catalog: Arc<TypeCatalog>,
    codec: OptionsCodec,
    live: DashMap<String, Arc<LiveBinding>>,
    notifier: Option<ChangeNotifier>,
}

impl SchemeRegistry {
    /// Create a registry over the given store and managed type catalog.
    ///
    /// The codec persists strict (minimal) payloads; see
    /// [`OptionsCodec`] for the mode semantics.
    pub fn new(store: Arc<dyn BindingStore>, catalog: Arc<TypeCatalog>) -> Self {
        Self {
            store,
            catalog,
            codec: OptionsCodec::new(crate::options::CodecMode::Strict),
            live: DashMap::new(),
            notifier: None,
        }
    }

    /// Attach a change notifier; mutations publish after the store and
    /// live state are updated.
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// The underlying store (source of truth)
    pub fn store(&self) -> &Arc<dyn BindingStore> {
        &self.store
    }

    /// The managed type catalog
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    fn encode_record(&self, binding: &Binding) -> Result<BindingRecord> {
        validate_scheme(&binding.scheme)?;
        let descriptor = self
            .catalog
            .descriptor(&binding.handler_type)
            .ok_or_else(|| BindingError::TypeNotFound(binding.handler_type.to_string()))?;
        Ok(BindingRecord {
            scheme: binding.scheme.clone(),
            display_name: binding.display_name.clone(),
            handler_type: TypeCodec::encode(&binding.handler_type)?,
            options: self
                .codec
                .serialize(descriptor.as_ref(), binding.options.as_ref())?,
            token: binding.token.clone(),
        })
    }

    fn decode_record(&self, record: &BindingRecord) -> Result<LiveBinding> {
        let handler_type = TypeCodec::decode(&record.handler_type, &self.catalog)?;
        let descriptor = self
            .catalog
            .descriptor(&handler_type)
            .ok_or_else(|| BindingError::TypeNotFound(handler_type.to_string()))?;
        let options = self.codec.deserialize(descriptor.as_ref(), &record.options)?;
        Ok(LiveBinding {
            scheme: record.scheme.clone(),
            display_name: record.display_name.clone(),
            handler_type,
            options,
            token: record.token.clone(),
        })
    }

    fn install(&self, live: LiveBinding) {
        // Single insert: dispatch entry and cached options swap together.
        self.live.insert(live.scheme.clone(), Arc::new(live));
    }

    fn publish(&self, scheme: &str, kind: ChangeKind) {
        if let Some(notifier) = &self.notifier {
            notifier.publish(BindingChange {
                scheme: scheme.to_string(),
                kind,
            });
        }
    }

    /// Bind a scheme: persist, then install the live entry.
    ///
    /// If the scheme is already bound this replaces it: the store write
    /// is conditioned on the live entry's token and the dispatch entry
    /// is swapped in one insert. Persistence failure leaves live state
    /// untouched.
    pub async fn add(
        &self,
        binding: &Binding,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        let mut record = self.encode_record(binding)?;
        let current = self
            .live
            .get(&binding.scheme)
            .map(|entry| entry.token.clone());
        let token = match current {
            Some(held) => {
                record.token = held;
                self.store.update(&record, cancel).await?
            }
            None => self.store.add(&record, cancel).await?,
        };

        self.install(LiveBinding {
            scheme: binding.scheme.clone(),
            display_name: binding.display_name.clone(),
            handler_type: binding.handler_type.clone(),
            options: Arc::clone(&binding.options),
            token: token.clone(),
        });
        tracing::info!(scheme = %binding.scheme, handler = %binding.handler_type, "scheme bound");
        self.publish(&binding.scheme, ChangeKind::Added);
        Ok(token)
    }

    /// Replace a bound scheme: persist with the caller's token, then swap
    /// the live entry. Fails with `NotFound` if the scheme is not bound.
    pub async fn update(
        &self,
        binding: &Binding,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        validate_scheme(&binding.scheme)?;
        if !self.live.contains_key(&binding.scheme) {
            return Err(BindingError::NotFound(binding.scheme.clone()));
        }

        let record = self.encode_record(binding)?;
        let token = self.store.update(&record, cancel).await?;

        self.install(LiveBinding {
            scheme: binding.scheme.clone(),
            display_name: binding.display_name.clone(),
            handler_type: binding.handler_type.clone(),
            options: Arc::clone(&binding.options),
            token: token.clone(),
        });
        tracing::info!(scheme = %binding.scheme, "scheme updated");
        self.publish(&binding.scheme, ChangeKind::Updated);
        Ok(token)
    }

    /// Unbind a scheme: persist the deletion, then clear the live entry.
    ///
    /// Acts only when the scheme is currently bound and fails with
    /// `NotFound` otherwise.
    pub async fn remove(
        &self,
        scheme: &str,
        token: &ConcurrencyToken,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_scheme(scheme)?;
        if !self.live.contains_key(scheme) {
            return Err(BindingError::NotFound(scheme.to_string()));
        }

        self.store.remove(scheme, token, cancel).await?;
        self.live.remove(scheme);
        tracing::info!(scheme, "scheme unbound");
        self.publish(scheme, ChangeKind::Deleted);
        Ok(())
    }

    /// Bulk-load every stored binding into the live table, once at
    /// process start before serving traffic.
    ///
    /// Lenient per entry: a binding whose handler type is outside the
    /// managed set, or whose payload is malformed, is skipped and logged
    /// so one bad record cannot block startup. Returns the number of
    /// schemes installed.
    pub async fn load(&self, cancel: &CancellationToken) -> Result<usize> {
        let records = self.store.list_all(cancel).await?;
        let mut installed = 0;
        for record in records {
            match self.decode_record(&record) {
                Ok(live) => {
                    self.install(live);
                    installed += 1;
                }
                Err(e) => {
                    tracing::warn!(scheme = %record.scheme, error = %e, "skipping binding during load");
                }
            }
        }
        tracing::info!(count = installed, "registry loaded");
        Ok(installed)
    }

    /// Look up the dispatch entry for a scheme.
    ///
    /// This is the hot path the request pipeline calls per request; it
    /// never touches the store.
    pub fn lookup(&self, scheme: &str) -> Option<Arc<LiveBinding>> {
        self.live.get(scheme).map(|entry| Arc::clone(entry.value()))
    }

    /// Fetch a binding directly from the store (bypassing the mirror),
    /// decoded into its typed form with the current token.
    ///
    /// Unlike [`load`](Self::load), decode failures here are surfaced,
    /// not skipped.
    pub async fn find_by_scheme(
        &self,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Binding>> {
        let Some(record) = self.store.find_by_scheme(scheme, cancel).await? else {
            return Ok(None);
        };
        let live = self.decode_record(&record)?;
        Ok(Some(Binding {
            scheme: live.scheme,
            display_name: live.display_name,
            handler_type: live.handler_type,
            options: live.options,
            token: live.token,
        }))
    }

    /// Currently bound scheme names
    pub fn schemes(&self) -> Vec<String> {
        self.live.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of bound schemes
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Apply a record that was mutated by another instance to local live
    /// state only (the store already holds it). Unmanaged or malformed
    /// records are skipped with a warning, as in [`load`](Self::load).
    pub fn apply_remote(&self, record: &BindingRecord) {
        match self.decode_record(record) {
            Ok(live) => self.install(live),
            Err(e) => {
                tracing::warn!(scheme = %record.scheme, error = %e, "skipping remote binding");
            }
        }
    }

    /// Clear a scheme from local live state only. Returns true if an
    /// entry was evicted.
    pub fn evict_local(&self, scheme: &str) -> bool {
        self.live.remove(scheme).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{default_catalog, OAuthOptions};
    use crate::store::SqliteBindingStore;
    use serde_json::json;

    fn registry() -> SchemeRegistry {
        let store = Arc::new(SqliteBindingStore::new_in_memory().unwrap());
        SchemeRegistry::new(store, Arc::new(default_catalog()))
    }

    fn oauth_binding(scheme: &str, client_id: &str) -> Binding {
        Binding::new(
            scheme,
            scheme.to_uppercase(),
            TypeIdentity::new("OAuthHandler"),
            OAuthOptions {
                client_id: client_id.to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_add_installs_dispatch_entry() {
        let registry = registry();
        let cancel = CancellationToken::new();

        let token = registry
            .add(&oauth_binding("github", "abc"), &cancel)
            .await
            .unwrap();
        assert!(matches!(token, ConcurrencyToken::Text(_)));

        let live = registry.lookup("github").unwrap();
        assert_eq!(live.display_name, "GITHUB");
        assert_eq!(live.handler_type, TypeIdentity::new("OAuthHandler"));
        assert_eq!(live.options_as::<OAuthOptions>().unwrap().client_id, "abc");
    }

    #[tokio::test]
    async fn test_unmanaged_handler_type_rejected_without_io() {
        let registry = registry();
        let cancel = CancellationToken::new();

        let binding = Binding::new(
            "saml",
            "SAML",
            TypeIdentity::new("SamlHandler"),
            OAuthOptions::default(),
        );
        let err = registry.add(&binding, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::TypeNotFound(_)));

        assert!(registry.lookup("saml").is_none());
        assert!(registry
            .store()
            .find_by_scheme("saml", &cancel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_requires_bound_scheme() {
        let registry = registry();
        let cancel = CancellationToken::new();

        let err = registry
            .update(&oauth_binding("github", "abc"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_acts_only_when_bound() {
        // Regression pin: removal must act when the binding IS found and
        // fail NotFound when it is not -- never the other way around.
        let registry = registry();
        let cancel = CancellationToken::new();

        let err = registry
            .remove("github", &ConcurrencyToken::None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::NotFound(_)));

        let token = registry
            .add(&oauth_binding("github", "abc"), &cancel)
            .await
            .unwrap();
        registry.remove("github", &token, &cancel).await.unwrap();
        assert!(registry.lookup("github").is_none());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_live_state_untouched() {
        let registry = registry();
        let cancel = CancellationToken::new();

        // Seed the store behind the registry's back so add() fails there.
        let seeded = registry
            .store()
            .add(
                &BindingRecord {
                    scheme: "github".to_string(),
                    display_name: "seeded".to_string(),
                    handler_type: r#"{"name":"OAuthHandler"}"#.to_string(),
                    options: json!({"client_id": "seeded"}),
                    token: ConcurrencyToken::None,
                },
                &cancel,
            )
            .await
            .unwrap();
        assert!(matches!(seeded, ConcurrencyToken::Text(_)));

        let err = registry
            .add(&oauth_binding("github", "abc"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::DuplicateScheme(_)));
        assert!(registry.lookup("github").is_none());
    }

    #[tokio::test]
    async fn test_load_skips_unmanaged_entries() {
        let registry = registry();
        let cancel = CancellationToken::new();

        registry
            .add(&oauth_binding("github", "abc"), &cancel)
            .await
            .unwrap();

        // A binding from a host configuration with a wider managed set.
        registry
            .store()
            .add(
                &BindingRecord {
                    scheme: "ldap".to_string(),
                    display_name: "LDAP".to_string(),
                    handler_type: r#"{"name":"LdapHandler"}"#.to_string(),
                    options: json!({}),
                    token: ConcurrencyToken::None,
                },
                &cancel,
            )
            .await
            .unwrap();

        let fresh = SchemeRegistry::new(
            Arc::clone(registry.store()),
            Arc::clone(registry.catalog()),
        );
        let installed = fresh.load(&cancel).await.unwrap();
        assert_eq!(installed, 1);
        assert!(fresh.lookup("github").is_some());
        assert!(fresh.lookup("ldap").is_none());
    }

    #[tokio::test]
    async fn test_find_by_scheme_surfaces_unmanaged_type() {
        let registry = registry();
        let cancel = CancellationToken::new();

        registry
            .store()
            .add(
                &BindingRecord {
                    scheme: "ldap".to_string(),
                    display_name: "LDAP".to_string(),
                    handler_type: r#"{"name":"LdapHandler"}"#.to_string(),
                    options: json!({}),
                    token: ConcurrencyToken::None,
                },
                &cancel,
            )
            .await
            .unwrap();

        let err = registry.find_by_scheme("ldap", &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::TypeNotFound(_)));
    }

    #[tokio::test]
    async fn test_replace_on_add_swaps_entry() {
        let registry = registry();
        let cancel = CancellationToken::new();

        let first = registry
            .add(&oauth_binding("github", "abc"), &cancel)
            .await
            .unwrap();

        // Re-binding an already bound scheme replaces it outright; the
        // caller does not carry a token.
        let second = registry
            .add(&oauth_binding("github", "xyz"), &cancel)
            .await
            .unwrap();
        assert_ne!(second, first);

        let live = registry.lookup("github").unwrap();
        assert_eq!(live.options_as::<OAuthOptions>().unwrap().client_id, "xyz");
        let stored = registry
            .find_by_scheme("github", &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.options_as::<OAuthOptions>().unwrap().client_id, "xyz");
    }
}
