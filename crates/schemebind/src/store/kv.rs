// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Key-value binding store (redb driver).
//!
//! Two tables in one database: `bindings` (scheme -> serialized record)
//! and `versions` (scheme -> numeric counter). Every mutation opens both
//! tables inside a single write transaction, checks its precondition, and
//! either commits both changes or aborts with no partial writes -- the
//! binding and its counter can never disagree.
//!
//! Tokens are the counter values: add stores 0, each update increments.

use crate::binding::{BindingRecord, ConcurrencyToken};
use crate::error::{BindingError, Result};
use crate::store::{check_submit, require_counter_token, BindingStore};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tokio_util::sync::CancellationToken;

const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");
const VERSIONS: TableDefinition<&str, u64> = TableDefinition::new("versions");

fn kv_err(e: impl std::fmt::Display) -> BindingError {
    BindingError::StoreUnavailable(e.to_string())
}

/// Key-value binding store backed by redb.
pub struct KvBindingStore {
    db: Database,
}

impl KvBindingStore {
    /// Open (or create) a file-based store
    pub fn new(path: &str) -> Result<Self> {
        let db = Database::create(path).map_err(kv_err)?;
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(kv_err)?;
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    // Tables must exist before the first read transaction.
    fn init_tables(&self) -> Result<()> {
        let txn = self.db.begin_write().map_err(kv_err)?;
        {
            txn.open_table(BINDINGS).map_err(kv_err)?;
            txn.open_table(VERSIONS).map_err(kv_err)?;
        }
        txn.commit().map_err(kv_err)?;
        Ok(())
    }

    fn decode_record(scheme: &str, bytes: &[u8], version: u64) -> Result<BindingRecord> {
        let mut record: BindingRecord = serde_json::from_slice(bytes).map_err(|e| {
            BindingError::Serialization(format!("malformed binding for '{scheme}': {e}"))
        })?;
        record.token = ConcurrencyToken::Counter(version);
        Ok(record)
    }
}

#[async_trait]
impl BindingStore for KvBindingStore {
    async fn add(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        check_submit(&record.scheme, cancel)?;
        let bytes = serde_json::to_vec(record)?;

        let txn = self.db.begin_write().map_err(kv_err)?;
        {
            let mut bindings = txn.open_table(BINDINGS).map_err(kv_err)?;
            // Precondition: key absent. Dropping the transaction on the
            // error path aborts with nothing written.
            if bindings
                .get(record.scheme.as_str())
                .map_err(kv_err)?
                .is_some()
            {
                return Err(BindingError::DuplicateScheme(record.scheme.clone()));
            }
            bindings
                .insert(record.scheme.as_str(), bytes.as_slice())
                .map_err(kv_err)?;

            let mut versions = txn.open_table(VERSIONS).map_err(kv_err)?;
            versions
                .insert(record.scheme.as_str(), 0u64)
                .map_err(kv_err)?;
        }
        txn.commit().map_err(kv_err)?;

        Ok(ConcurrencyToken::Counter(0))
    }

    async fn update(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        check_submit(&record.scheme, cancel)?;
        let caller_counter = require_counter_token(&record.token, &record.scheme)?;
        let bytes = serde_json::to_vec(record)?;

        let next = caller_counter + 1;
        let txn = self.db.begin_write().map_err(kv_err)?;
        {
            let mut versions = txn.open_table(VERSIONS).map_err(kv_err)?;
            let stored = versions
                .get(record.scheme.as_str())
                .map_err(kv_err)?
                .map(|guard| guard.value());
            match stored {
                None => return Err(BindingError::NotFound(record.scheme.clone())),
                Some(counter) if counter != caller_counter => {
                    return Err(BindingError::ConcurrencyConflict(record.scheme.clone()));
                }
                Some(_) => {}
            }
            versions
                .insert(record.scheme.as_str(), next)
                .map_err(kv_err)?;

            let mut bindings = txn.open_table(BINDINGS).map_err(kv_err)?;
            bindings
                .insert(record.scheme.as_str(), bytes.as_slice())
                .map_err(kv_err)?;
        }
        txn.commit().map_err(kv_err)?;

        Ok(ConcurrencyToken::Counter(next))
    }

    async fn remove(
        &self,
        scheme: &str,
        token: &ConcurrencyToken,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_submit(scheme, cancel)?;
        let caller_counter = require_counter_token(token, scheme)?;

        let txn = self.db.begin_write().map_err(kv_err)?;
        {
            let mut versions = txn.open_table(VERSIONS).map_err(kv_err)?;
            let stored = versions
                .get(scheme)
                .map_err(kv_err)?
                .map(|guard| guard.value());
            match stored {
                None => return Err(BindingError::NotFound(scheme.to_string())),
                Some(counter) if counter != caller_counter => {
                    return Err(BindingError::ConcurrencyConflict(scheme.to_string()));
                }
                Some(_) => {}
            }
            versions.remove(scheme).map_err(kv_err)?;

            let mut bindings = txn.open_table(BINDINGS).map_err(kv_err)?;
            bindings.remove(scheme).map_err(kv_err)?;
        }
        txn.commit().map_err(kv_err)?;

        Ok(())
    }

    async fn find_by_scheme(
        &self,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<BindingRecord>> {
        check_submit(scheme, cancel)?;

        let txn = self.db.begin_read().map_err(kv_err)?;
        let bindings = txn.open_table(BINDINGS).map_err(kv_err)?;
        let Some(bytes) = bindings.get(scheme).map_err(kv_err)? else {
            return Ok(None);
        };

        let versions = txn.open_table(VERSIONS).map_err(kv_err)?;
        let version = versions
            .get(scheme)
            .map_err(kv_err)?
            .map(|guard| guard.value())
            .unwrap_or(0);

        Ok(Some(Self::decode_record(scheme, bytes.value(), version)?))
    }

    async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<BindingRecord>> {
        if cancel.is_cancelled() {
            return Err(BindingError::Cancelled);
        }

        let txn = self.db.begin_read().map_err(kv_err)?;
        let bindings = txn.open_table(BINDINGS).map_err(kv_err)?;
        let versions = txn.open_table(VERSIONS).map_err(kv_err)?;

        let mut records = Vec::new();
        for entry in bindings.iter().map_err(kv_err)? {
            let (key, value) = entry.map_err(kv_err)?;
            let scheme = key.value();
            let version = versions
                .get(scheme)
                .map_err(kv_err)?
                .map(|guard| guard.value())
                .unwrap_or(0);
            records.push(Self::decode_record(scheme, value.value(), version)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(scheme: &str, client_id: &str) -> BindingRecord {
        BindingRecord {
            scheme: scheme.to_string(),
            display_name: scheme.to_string(),
            handler_type: r#"{"name":"OAuthHandler"}"#.to_string(),
            options: json!({ "client_id": client_id }),
            token: ConcurrencyToken::None,
        }
    }

    #[tokio::test]
    async fn test_add_assigns_counter_zero() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        let token = store.add(&record("github", "abc"), &cancel).await.unwrap();
        assert_eq!(token, ConcurrencyToken::Counter(0));

        let found = store.find_by_scheme("github", &cancel).await.unwrap().unwrap();
        assert_eq!(found.token, ConcurrencyToken::Counter(0));
        assert_eq!(found.options["client_id"], "abc");
    }

    #[tokio::test]
    async fn test_duplicate_add_aborts_cleanly() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        store.add(&record("github", "abc"), &cancel).await.unwrap();
        let err = store.add(&record("github", "xyz"), &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::DuplicateScheme(_)));

        let found = store.find_by_scheme("github", &cancel).await.unwrap().unwrap();
        assert_eq!(found.options["client_id"], "abc");
        assert_eq!(found.token, ConcurrencyToken::Counter(0));
    }

    #[tokio::test]
    async fn test_update_increments_counter() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        let t0 = store.add(&record("github", "abc"), &cancel).await.unwrap();

        let mut rec = record("github", "xyz");
        rec.token = t0.clone();
        let t1 = store.update(&rec, &cancel).await.unwrap();
        assert_eq!(t1, ConcurrencyToken::Counter(1));

        // The stale counter loses; store stays at the winner's state.
        let mut stale = record("github", "old");
        stale.token = t0;
        let err = store.update(&stale, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::ConcurrencyConflict(_)));

        let found = store.find_by_scheme("github", &cancel).await.unwrap().unwrap();
        assert_eq!(found.options["client_id"], "xyz");
        assert_eq!(found.token, ConcurrencyToken::Counter(1));
    }

    #[tokio::test]
    async fn test_remove_deletes_both_entries() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        let token = store.add(&record("github", "abc"), &cancel).await.unwrap();

        let err = store
            .remove("github", &ConcurrencyToken::Counter(9), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::ConcurrencyConflict(_)));

        store.remove("github", &token, &cancel).await.unwrap();
        assert!(store.find_by_scheme("github", &cancel).await.unwrap().is_none());

        // A re-add starts the counter over, proving both entries died.
        let token = store.add(&record("github", "new"), &cancel).await.unwrap();
        assert_eq!(token, ConcurrencyToken::Counter(0));
    }

    #[tokio::test]
    async fn test_update_missing_scheme_is_not_found() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        let mut rec = record("ghost", "abc");
        rec.token = ConcurrencyToken::Counter(0);
        let err = store.update(&rec, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_text_token_rejected_by_counter_driver() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        store.add(&record("github", "abc"), &cancel).await.unwrap();
        let mut rec = record("github", "xyz");
        rec.token = ConcurrencyToken::Text("etag".to_string());
        let err = store.update(&rec, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_all() {
        let store = KvBindingStore::new_in_memory().unwrap();
        let cancel = CancellationToken::new();

        store.add(&record("github", "a"), &cancel).await.unwrap();
        store.add(&record("gitlab", "b"), &cancel).await.unwrap();

        let mut schemes: Vec<String> = store
            .list_all(&cancel)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.scheme)
            .collect();
        schemes.sort();
        assert_eq!(schemes, vec!["github", "gitlab"]);
    }
}
