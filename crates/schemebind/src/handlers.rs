// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Built-in managed handler options types.
//!
//! These ship with the crate so the CLI and tests have real managed types
//! to bind; hosts embedding the library register their own types through
//! [`TypeCatalogBuilder`](crate::catalog::TypeCatalogBuilder) instead of
//! (or in addition to) these.

use crate::catalog::TypeCatalog;
use crate::catalog::TypeCatalogBuilder;
use crate::options::CertificateData;
use crate::typeid::TypeIdentity;
use serde::{Deserialize, Serialize};

/// Configuration for an OAuth 2.0 protocol handler.
///
/// Only data members are persisted; `on_token_refresh` is behavior and
/// stays out of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthOptions {
    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Requested scopes
    pub scopes: Vec<String>,

    /// Authorization header prefix
    pub header_prefix: String,

    /// Verify the remote host's TLS identity when talking to the
    /// provider. An explicit `false` is preserved by the codec even
    /// though it differs from this type's default of `true`.
    pub require_tls_validation: bool,

    /// Client certificate for mutual TLS, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<CertificateData>,

    /// Callback invoked after a token refresh (behavior, never persisted)
    #[serde(skip)]
    pub on_token_refresh: Option<fn(&str)>,
}

impl Default for OAuthOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            scopes: Vec::new(),
            header_prefix: "Bearer".to_string(),
            require_tls_validation: true,
            client_certificate: None,
            on_token_refresh: None,
        }
    }
}

/// One accepted API key (a concrete value object; collections of these
/// are persisted as-is)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    /// Human-readable key owner
    pub name: String,
    /// The key material
    pub key: String,
    /// Whether the key is currently accepted
    pub enabled: bool,
}

/// Configuration for a static API key protocol handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyOptions {
    /// Header the key is read from
    pub header_name: String,

    /// Accepted keys
    pub keys: Vec<ApiKeyEntry>,
}

impl Default for ApiKeyOptions {
    fn default() -> Self {
        Self {
            header_name: "x-api-key".to_string(),
            keys: Vec::new(),
        }
    }
}

/// Catalog with the built-in handler types registered, including the
/// declared generic instantiation of the OAuth handler.
pub fn default_catalog() -> TypeCatalog {
    TypeCatalogBuilder::new()
        .register::<OAuthOptions>(TypeIdentity::new("OAuthHandler"))
        .register::<OAuthOptions>(TypeIdentity::generic(
            "OAuthHandler",
            vec![TypeIdentity::new("GitHubProfile")],
        ))
        .register::<ApiKeyOptions>(TypeIdentity::new("ApiKeyHandler"))
        .build()
}
