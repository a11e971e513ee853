// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Document binding store.
//!
//! One JSON document per scheme under a root directory, with the scheme
//! as the document key and an etag field for session-style optimistic
//! concurrency: a conditional save compares the stored etag against the
//! etag the caller loaded, under the store's write lock, and writes go
//! through a temp file plus atomic rename so a document is never observed
//! half-written.
//!
//! This driver models a document-database session on local files; real
//! server clients are out of scope at the storage boundary.

use crate::binding::{BindingRecord, ConcurrencyToken};
use crate::error::{BindingError, Result};
use crate::store::{check_submit, require_text_token, BindingStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The persisted document shape, one per scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemeDocument {
    scheme: String,
    display_name: String,
    serialized_handler_type: String,
    serialized_options: serde_json::Value,
    etag: String,
}

impl SchemeDocument {
    fn from_record(record: &BindingRecord, etag: String) -> Self {
        Self {
            scheme: record.scheme.clone(),
            display_name: record.display_name.clone(),
            serialized_handler_type: record.handler_type.clone(),
            serialized_options: record.options.clone(),
            etag,
        }
    }

    fn into_record(self) -> BindingRecord {
        BindingRecord {
            scheme: self.scheme,
            display_name: self.display_name,
            handler_type: self.serialized_handler_type,
            options: self.serialized_options,
            token: ConcurrencyToken::Text(self.etag),
        }
    }
}

/// Document binding store backed by a directory of JSON documents.
pub struct DocumentBindingStore {
    root: PathBuf,
    // Serializes the etag check with the subsequent write (session scope).
    write_lock: Mutex<()>,
}

impl DocumentBindingStore {
    /// Open (or create) a document store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let root = dir.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn document_path(&self, scheme: &str) -> PathBuf {
        self.root.join(format!("{scheme}.json"))
    }

    fn read_document(path: &Path) -> Result<Option<SchemeDocument>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_str(&text).map_err(|e| {
            BindingError::Serialization(format!(
                "malformed document at {}: {e}",
                path.display()
            ))
        })?;
        Ok(Some(doc))
    }

    fn write_document(&self, doc: &SchemeDocument) -> Result<()> {
        let path = self.document_path(&doc.scheme);
        let tmp = self.root.join(format!("{}.json.tmp", doc.scheme));
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[async_trait]
impl BindingStore for DocumentBindingStore {
    async fn add(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        check_submit(&record.scheme, cancel)?;

        let _session = self.write_lock.lock();
        if self.document_path(&record.scheme).exists() {
            return Err(BindingError::DuplicateScheme(record.scheme.clone()));
        }

        let etag = Uuid::new_v4().to_string();
        self.write_document(&SchemeDocument::from_record(record, etag.clone()))?;
        Ok(ConcurrencyToken::Text(etag))
    }

    async fn update(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        check_submit(&record.scheme, cancel)?;
        let caller_etag = require_text_token(&record.token, &record.scheme)?;

        let _session = self.write_lock.lock();
        let stored = Self::read_document(&self.document_path(&record.scheme))?
            .ok_or_else(|| BindingError::NotFound(record.scheme.clone()))?;
        if stored.etag != caller_etag {
            return Err(BindingError::ConcurrencyConflict(record.scheme.clone()));
        }

        let etag = Uuid::new_v4().to_string();
        self.write_document(&SchemeDocument::from_record(record, etag.clone()))?;
        Ok(ConcurrencyToken::Text(etag))
    }

    async fn remove(
        &self,
        scheme: &str,
        token: &ConcurrencyToken,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_submit(scheme, cancel)?;
        let caller_etag = require_text_token(token, scheme)?;

        let _session = self.write_lock.lock();
        let path = self.document_path(scheme);
        let stored = Self::read_document(&path)?
            .ok_or_else(|| BindingError::NotFound(scheme.to_string()))?;
        if stored.etag != caller_etag {
            return Err(BindingError::ConcurrencyConflict(scheme.to_string()));
        }

        fs::remove_file(&path)?;
        Ok(())
    }

    async fn find_by_scheme(
        &self,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<BindingRecord>> {
        check_submit(scheme, cancel)?;

        let doc = Self::read_document(&self.document_path(scheme))?;
        Ok(doc.map(SchemeDocument::into_record))
    }

    async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<BindingRecord>> {
        if cancel.is_cancelled() {
            return Err(BindingError::Cancelled);
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path) {
                Ok(Some(doc)) => records.push(doc.into_record()),
                Ok(None) => {}
                Err(e) => {
                    // One bad document must not block a bulk listing.
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed document");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

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
    async fn test_add_and_find() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBindingStore::new(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        let token = store.add(&record("github", "abc"), &cancel).await.unwrap();
        let found = store.find_by_scheme("github", &cancel).await.unwrap().unwrap();
        assert_eq!(found.options["client_id"], "abc");
        assert_eq!(found.token, token);
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBindingStore::new(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        store.add(&record("github", "abc"), &cancel).await.unwrap();
        let err = store.add(&record("github", "xyz"), &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::DuplicateScheme(_)));
    }

    #[tokio::test]
    async fn test_conditional_save_conflicts_on_stale_etag() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBindingStore::new(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        let t1 = store.add(&record("github", "abc"), &cancel).await.unwrap();

        let mut winner = record("github", "xyz");
        winner.token = t1.clone();
        let t2 = store.update(&winner, &cancel).await.unwrap();

        let mut loser = record("github", "stale");
        loser.token = t1;
        let err = store.update(&loser, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::ConcurrencyConflict(_)));

        let found = store.find_by_scheme("github", &cancel).await.unwrap().unwrap();
        assert_eq!(found.options["client_id"], "xyz");
        assert_eq!(found.token, t2);
    }

    #[tokio::test]
    async fn test_remove_with_matching_etag() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBindingStore::new(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        let token = store.add(&record("github", "abc"), &cancel).await.unwrap();

        let stale = ConcurrencyToken::Text("bogus".to_string());
        let err = store.remove("github", &stale, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::ConcurrencyConflict(_)));
        assert!(store.find_by_scheme("github", &cancel).await.unwrap().is_some());

        store.remove("github", &token, &cancel).await.unwrap();
        assert!(store.find_by_scheme("github", &cancel).await.unwrap().is_none());

        let err = store.remove("github", &token, &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_all_skips_malformed_documents() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBindingStore::new(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        store.add(&record("github", "abc"), &cancel).await.unwrap();
        store.add(&record("gitlab", "def"), &cancel).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

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

    #[tokio::test]
    async fn test_find_on_malformed_document_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let store = DocumentBindingStore::new(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        let err = store.find_by_scheme("broken", &cancel).await.unwrap_err();
        assert!(matches!(err, BindingError::Serialization(_)));
    }
}
