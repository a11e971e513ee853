// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Managed type catalog.
//!
//! The catalog is the closed set of handler types the host permits to be
//! dynamically bound, built once at startup. Each entry carries a small
//! closure vtable (serialize / deserialize / default prototype) for its
//! options type, so polymorphic options can be handled without any
//! run-time type scanning: resolution is a plain map lookup.

use crate::error::{BindingError, Result};
use crate::typeid::TypeIdentity;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Type-erased options instance as held by the live dispatch table
pub type ErasedOptions = Arc<dyn Any + Send + Sync>;

/// Contract for configuration objects that may be dynamically bound.
///
/// `Default` supplies the prototype instance used for strict-mode
/// default-value elision; behavior members (callbacks) must be marked
/// `#[serde(skip)]` so only reconstructible data is persisted.
pub trait HandlerOptions:
    Serialize + DeserializeOwned + Default + Send + Sync + 'static
{
}

impl<T> HandlerOptions for T where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static
{
}

type SerializeFn = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Value> + Send + Sync>;
type DeserializeFn = Box<dyn Fn(Value) -> Result<ErasedOptions> + Send + Sync>;
type DefaultFn = Box<dyn Fn() -> Result<Value> + Send + Sync>;

/// A managed handler type plus the codec vtable for its options type.
pub struct HandlerDescriptor {
    handler_type: TypeIdentity,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
    default_value: DefaultFn,
}

impl HandlerDescriptor {
    fn for_options<O: HandlerOptions>(handler_type: TypeIdentity) -> Self {
        let name = handler_type.to_string();
        let name_de = name.clone();
        Self {
            handler_type,
            serialize: Box::new(move |any| {
                let options = any.downcast_ref::<O>().ok_or_else(|| {
                    BindingError::Serialization(format!(
                        "options instance does not match handler type {name}"
                    ))
                })?;
                Ok(serde_json::to_value(options)?)
            }),
            deserialize: Box::new(move |value| {
                let options: O = serde_json::from_value(value).map_err(|e| {
                    BindingError::Serialization(format!(
                        "options payload for {name_de} is malformed: {e}"
                    ))
                })?;
                Ok(Arc::new(options) as ErasedOptions)
            }),
            default_value: Box::new(|| Ok(serde_json::to_value(O::default())?)),
        }
    }

    /// The handler type identity this descriptor manages
    pub fn handler_type(&self) -> &TypeIdentity {
        &self.handler_type
    }

    /// Serialize a type-erased options instance to its payload form
    pub fn serialize_options(&self, options: &(dyn Any + Send + Sync)) -> Result<Value> {
        (self.serialize)(options)
    }

    /// Materialize a payload back into a typed (then erased) options instance
    pub fn deserialize_options(&self, payload: Value) -> Result<ErasedOptions> {
        (self.deserialize)(payload)
    }

    /// Serialize a default-constructed options instance (strict-mode prototype)
    pub fn default_options_value(&self) -> Result<Value> {
        (self.default_value)()
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler_type", &self.handler_type)
            .finish()
    }
}

/// Immutable catalog of managed handler types, keyed by structural identity.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    descriptors: HashMap<String, Arc<HandlerDescriptor>>,
    known_names: HashSet<String>,
}

impl TypeCatalog {
    /// Look up the descriptor for a handler type identity, if managed
    pub fn descriptor(&self, handler_type: &TypeIdentity) -> Option<Arc<HandlerDescriptor>> {
        self.descriptors.get(&handler_type.to_string()).cloned()
    }

    /// Returns true if the handler type belongs to the managed set
    pub fn is_managed(&self, handler_type: &TypeIdentity) -> bool {
        self.descriptors.contains_key(&handler_type.to_string())
    }

    /// Returns true if a bare type name appears anywhere in a registered
    /// identity (as a handler name or a generic argument)
    pub fn is_known_type(&self, name: &str) -> bool {
        self.known_names.contains(name)
    }

    /// Number of managed handler types
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if no handler types are registered
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered handler identities, for startup logging
    pub fn handler_types(&self) -> impl Iterator<Item = &TypeIdentity> {
        self.descriptors.values().map(|d| d.handler_type())
    }
}

/// Builder for [`TypeCatalog`]; register every manageable handler type
/// (and each declared generic instantiation) before `build()`.
#[derive(Debug, Default)]
pub struct TypeCatalogBuilder {
    catalog: TypeCatalog,
}

impl TypeCatalogBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler type whose options are of type `O`.
    ///
    /// Re-registering the same identity replaces the earlier entry.
    pub fn register<O: HandlerOptions>(mut self, handler_type: TypeIdentity) -> Self {
        for name in handler_type.names() {
            self.catalog.known_names.insert(name.to_string());
        }
        let key = handler_type.to_string();
        let descriptor = Arc::new(HandlerDescriptor::for_options::<O>(handler_type));
        self.catalog.descriptors.insert(key, descriptor);
        self
    }

    /// Finalize the catalog
    pub fn build(self) -> TypeCatalog {
        self.catalog
    }
}
