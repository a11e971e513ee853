// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Binding data model.
//!
//! [`Binding`] is the caller-facing unit (typed, erased options);
//! [`BindingRecord`] is the serialized unit the storage drivers persist.
//! The registry layer applies the type and options codecs between the
//! two, so every driver sees the same pre-serialized shape.

use crate::catalog::ErasedOptions;
use crate::error::{BindingError, Result};
use crate::typeid::TypeIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque version marker for optimistic concurrency.
///
/// The representation is backend-dependent: the relational and document
/// drivers use text tokens (uuid / etag), the key-value driver a numeric
/// counter. A fresh binding carries `None` until its first successful add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConcurrencyToken {
    /// Not yet persisted
    #[default]
    None,
    /// Text token (uuid or etag)
    Text(String),
    /// Numeric counter token
    Counter(u64),
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyToken::None => write!(f, "(none)"),
            ConcurrencyToken::Text(s) => write!(f, "{}", s),
            ConcurrencyToken::Counter(n) => write!(f, "{}", n),
        }
    }
}

/// A scheme definition as callers see it: scheme name, handler type, and
/// the typed (erased) options instance.
#[derive(Clone)]
pub struct Binding {
    /// Globally unique scheme name (the natural key, immutable)
    pub scheme: String,

    /// Human-readable name, mutable
    pub display_name: String,

    /// Handler type that processes requests for this scheme
    pub handler_type: TypeIdentity,

    /// Configuration instance; concrete shape determined by `handler_type`
    pub options: ErasedOptions,

    /// Version marker from the last successful store operation
    pub token: ConcurrencyToken,
}

impl Binding {
    /// Create a new, not-yet-persisted binding from a typed options value
    pub fn new<O: Send + Sync + 'static>(
        scheme: impl Into<String>,
        display_name: impl Into<String>,
        handler_type: TypeIdentity,
        options: O,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            display_name: display_name.into(),
            handler_type,
            options: Arc::new(options),
            token: ConcurrencyToken::None,
        }
    }

    /// Borrow the options as their concrete type, if it matches
    pub fn options_as<O: 'static>(&self) -> Option<&O> {
        self.options.downcast_ref::<O>()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("scheme", &self.scheme)
            .field("display_name", &self.display_name)
            .field("handler_type", &self.handler_type)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// The serialized binding the storage drivers persist: handler type as an
/// encoded string, options as an opaque payload. The concurrency token is
/// carried out-of-band by each driver (column / etag / counter table) and
/// is therefore not part of the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRecord {
    /// Scheme name (natural key)
    pub scheme: String,

    /// Human-readable name
    pub display_name: String,

    /// Handler type identity, encoded via `TypeCodec`
    pub handler_type: String,

    /// Options payload, encoded via `OptionsCodec`
    pub options: serde_json::Value,

    /// Caller's token for update/remove; assigned by the driver on reads
    #[serde(skip)]
    pub token: ConcurrencyToken,
}

/// Validate a scheme name before any I/O.
///
/// Schemes are non-empty and limited to `[A-Za-z0-9._-]`, not starting
/// with a dot; the charset keeps document filenames and key-value keys
/// safe across all drivers without escaping.
pub fn validate_scheme(scheme: &str) -> Result<()> {
    if scheme.is_empty() {
        return Err(BindingError::Validation("scheme name is empty".to_string()));
    }
    if scheme.starts_with('.') {
        return Err(BindingError::Validation(format!(
            "scheme '{scheme}' must not start with a dot"
        )));
    }
    if let Some(bad) = scheme
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(BindingError::Validation(format!(
            "scheme '{scheme}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}
