// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Error taxonomy for registry and store operations.

use thiserror::Error;

/// Result alias for binding operations
pub type Result<T> = std::result::Result<T, BindingError>;

/// Errors surfaced by the registry, codecs, and storage drivers.
///
/// No variant is retried internally; `ConcurrencyConflict` in particular
/// must be handled by the caller with a reload-and-retry of its own.
#[derive(Debug, Error)]
pub enum BindingError {
    /// Input rejected before any I/O was attempted
    #[error("validation failed: {0}")]
    Validation(String),

    /// Add targeted a scheme that already exists
    #[error("scheme already exists: {0}")]
    DuplicateScheme(String),

    /// Update/Remove/lookup targeted a scheme that is absent or not bound
    #[error("scheme not found: {0}")]
    NotFound(String),

    /// The supplied concurrency token no longer matches the stored one
    #[error("concurrency conflict on scheme: {0}")]
    ConcurrencyConflict(String),

    /// An encoded type name could not be resolved against the managed catalog
    #[error("type not found in managed catalog: {0}")]
    TypeNotFound(String),

    /// Options payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cancellation was requested before the operation was submitted
    #[error("operation cancelled before submission")]
    Cancelled,

    /// The storage engine failed (I/O, corruption, engine-level error)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<serde_json::Error> for BindingError {
    fn from(e: serde_json::Error) -> Self {
        BindingError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for BindingError {
    fn from(e: std::io::Error) -> Self {
        BindingError::StoreUnavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for BindingError {
    fn from(e: rusqlite::Error) -> Self {
        BindingError::StoreUnavailable(e.to_string())
    }
}
