// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Options payload codec.
//!
//! Serializes the polymorphic configuration object attached to a binding
//! into a backend-agnostic JSON payload and back, given the handler's
//! [`HandlerDescriptor`](crate::catalog::HandlerDescriptor).
//!
//! Rules (all load-bearing for round-trip fidelity):
//!
//! - Null members are stripped on both directions; "absent" and "null"
//!   are indistinguishable after a round trip.
//! - Behavior members (callbacks, live interface references) never reach
//!   the payload: options types mark them `#[serde(skip)]`.
//! - [`CodecMode::Strict`] additionally omits members whose value equals
//!   the type's default-constructed prototype, producing minimal payloads.
//!   The prototype is computed once per type and cached in a
//!   [`TypeDefaultsCache`] owned by the codec. [`CodecMode::Full`] encodes
//!   everything, defaults included.
//! - The host-TLS-verification flag (`require_tls_validation`) is a known
//!   special case: an explicit `false` survives strict elision on write,
//!   and on read the raw payload is re-scanned and a literal `false` is
//!   force-applied after general deserialization.
//!
//! All three storage drivers persist Strict payloads; Full is available
//! for callers that want fully explicit dumps.

use crate::catalog::{ErasedOptions, HandlerDescriptor};
use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known field name for the host-TLS-verification flag.
///
/// An explicit `false` here must never be dropped by default-value
/// elision; see the module docs.
pub const TLS_VALIDATION_FIELD: &str = "require_tls_validation";

/// Payload shaping mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecMode {
    /// Encode every member unconditionally, defaulted values included
    #[default]
    Full,
    /// Omit members equal to the type's default-constructed prototype
    Strict,
}

/// Cache of default-constructed prototype payloads, one per handler type.
///
/// Built lazily on first use, never evicted, safe for concurrent reads.
#[derive(Debug, Default)]
pub struct TypeDefaultsCache {
    inner: RwLock<HashMap<String, Arc<Value>>>,
}

impl TypeDefaultsCache {
    fn get_or_build(
        &self,
        key: &str,
        build: impl FnOnce() -> Result<Value>,
    ) -> Result<Arc<Value>> {
        if let Some(value) = self.inner.read().get(key) {
            return Ok(Arc::clone(value));
        }
        let built = Arc::new(build()?);
        let mut guard = self.inner.write();
        Ok(Arc::clone(guard.entry(key.to_string()).or_insert(built)))
    }
}

/// Serializes and deserializes options payloads for managed handler types.
#[derive(Debug, Default)]
pub struct OptionsCodec {
    mode: CodecMode,
    defaults: TypeDefaultsCache,
}

impl OptionsCodec {
    /// Create a codec with the given payload mode
    pub fn new(mode: CodecMode) -> Self {
        Self {
            mode,
            defaults: TypeDefaultsCache::default(),
        }
    }

    /// The payload mode this codec applies on serialize
    pub fn mode(&self) -> CodecMode {
        self.mode
    }

    /// Serialize a type-erased options instance to its payload form.
    pub fn serialize(
        &self,
        descriptor: &HandlerDescriptor,
        options: &(dyn Any + Send + Sync),
    ) -> Result<Value> {
        let mut value = descriptor.serialize_options(options)?;
        strip_nulls(&mut value);

        if self.mode == CodecMode::Strict {
            let key = descriptor.handler_type().to_string();
            let prototype = self
                .defaults
                .get_or_build(&key, || descriptor.default_options_value())?;
            elide_defaults(&mut value, &prototype);
        }

        Ok(value)
    }

    /// Materialize a payload back into a typed (then erased) options
    /// instance, applying the TLS-flag compensation from the raw payload.
    pub fn deserialize(
        &self,
        descriptor: &HandlerDescriptor,
        payload: &Value,
    ) -> Result<ErasedOptions> {
        let mut value = payload.clone();
        strip_nulls(&mut value);

        // Re-scan the raw payload: an explicit `false` for the TLS flag
        // must reach the typed instance even if normalization dropped it.
        if payload.get(TLS_VALIDATION_FIELD) == Some(&Value::Bool(false)) {
            if let Value::Object(map) = &mut value {
                map.insert(TLS_VALIDATION_FIELD.to_string(), Value::Bool(false));
            }
        }

        descriptor.deserialize_options(value)
    }
}

/// Remove null members recursively (object members only; array elements
/// are kept positional).
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                strip_nulls(v);
            }
        }
        _ => {}
    }
}

/// Drop top-level members equal to the prototype's value, keeping an
/// explicit `false` TLS-verification flag.
fn elide_defaults(value: &mut Value, prototype: &Value) {
    let (Value::Object(map), Value::Object(proto)) = (value, prototype) else {
        return;
    };
    map.retain(|field, v| {
        if field == TLS_VALIDATION_FIELD && *v == Value::Bool(false) {
            return true;
        }
        proto.get(field) != Some(v)
    });
}

/// Binary credential material (certificate bytes), persisted as base64
/// text and reconstructed from raw bytes on read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateData(pub Vec<u8>);

impl CertificateData {
    /// Exported raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for CertificateData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for CertificateData {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(CertificateData(bytes))
    }
}
