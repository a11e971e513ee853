// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Binding store abstraction.
//!
//! Backend-agnostic interface for persisting scheme bindings with
//! optimistic concurrency. Three drivers implement it:
//!
//! - [`SqliteBindingStore`] -- relational, one row per scheme with a uuid
//!   version column
//! - [`DocumentBindingStore`] -- one JSON document per scheme with an
//!   etag, conditional save
//! - [`KvBindingStore`] -- redb key-value engine, two tables (binding +
//!   version counter) mutated in a single all-or-nothing transaction
//!
//! Every mutating operation performs its concurrency check and its write
//! as one indivisible step in the backend's native transaction primitive.
//! Cancellation is honored before submission only: once a transaction is
//! issued it runs to completion.

pub mod document;
pub mod kv;
pub mod sqlite;

pub use document::DocumentBindingStore;
pub use kv::KvBindingStore;
pub use sqlite::SqliteBindingStore;

use crate::binding::{BindingRecord, ConcurrencyToken};
use crate::error::{BindingError, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Durable storage for scheme bindings.
///
/// The store is the source of truth; the in-memory registry only mirrors
/// it. All operations are keyed by scheme name and concurrency-safe per
/// scheme: concurrent writers to the same scheme are resolved by the
/// token check, and exactly one wins. Losers receive
/// [`BindingError::ConcurrencyConflict`] and must reload and retry
/// themselves -- no driver retries internally.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Persist a new binding.
    ///
    /// Fails with [`BindingError::DuplicateScheme`] if the scheme already
    /// exists (no partial write). Returns the initial concurrency token.
    async fn add(&self, record: &BindingRecord, cancel: &CancellationToken)
        -> Result<ConcurrencyToken>;

    /// Replace an existing binding (full replace, never a partial patch).
    ///
    /// `record.token` must match the stored token; fails with
    /// [`BindingError::ConcurrencyConflict`] otherwise, leaving storage
    /// untouched, or [`BindingError::NotFound`] if the scheme is absent.
    /// Returns the new token.
    async fn update(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken>;

    /// Delete a binding. The supplied token must match the stored one
    /// (token-checked removal is enforced uniformly by every driver).
    async fn remove(
        &self,
        scheme: &str,
        token: &ConcurrencyToken,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Fetch one binding by scheme, with its current token.
    async fn find_by_scheme(
        &self,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<BindingRecord>>;

    /// Fetch all bindings, eagerly materialized. Ordering is unspecified.
    async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<BindingRecord>>;
}

/// Shared pre-I/O checks: cancellation, then scheme validation.
pub(crate) fn check_submit(scheme: &str, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BindingError::Cancelled);
    }
    crate::binding::validate_scheme(scheme)
}

/// Extract the text token an update/remove against a text-token driver
/// requires.
pub(crate) fn require_text_token<'a>(token: &'a ConcurrencyToken, scheme: &str) -> Result<&'a str> {
    match token {
        ConcurrencyToken::Text(s) => Ok(s),
        _ => Err(BindingError::Validation(format!(
            "scheme '{scheme}' requires a text concurrency token, got {token}"
        ))),
    }
}

/// Extract the counter token the key-value driver requires.
pub(crate) fn require_counter_token(token: &ConcurrencyToken, scheme: &str) -> Result<u64> {
    match token {
        ConcurrencyToken::Counter(n) => Ok(*n),
        _ => Err(BindingError::Validation(format!(
            "scheme '{scheme}' requires a counter concurrency token, got {token}"
        ))),
    }
}
