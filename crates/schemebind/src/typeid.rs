// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! Structural type identities and their portable string encoding.
//!
//! A [`TypeIdentity`] names a handler type plus, for generic handlers, an
//! ordered list of argument identities (recursive). The encoding is a
//! compact JSON tree (`{"name": ..., "args": [...]}`, `args` omitted when
//! empty) so a stored blob can be materialized back into the correct
//! concrete type without the reader knowing it in advance.
//!
//! Decoding always resolves names against the closed [`TypeCatalog`];
//! an unknown name fails with [`BindingError::TypeNotFound`] rather than
//! silently substituting a type, since stored data must never be able to
//! activate unintended handler code.

use crate::catalog::TypeCatalog;
use crate::error::{BindingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A structural encoding of a run-time handler or options type.
///
/// Two identities are equal iff their structural encodings match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeIdentity {
    /// Fully-qualified type name
    pub name: String,

    /// Ordered generic type arguments (empty for non-generic types)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<TypeIdentity>,
}

impl TypeIdentity {
    /// Create a non-generic type identity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Create a generic type identity with the given argument identities
    pub fn generic(name: impl Into<String>, args: Vec<TypeIdentity>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Returns true if this identity carries generic arguments
    pub fn is_generic(&self) -> bool {
        !self.args.is_empty()
    }

    /// Iterate over every name in the tree (self plus arguments, depth-first)
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.push(self.name.as_str());
        for arg in &self.args {
            arg.collect_names(out);
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

/// Serializes and deserializes [`TypeIdentity`] values to portable strings.
pub struct TypeCodec;

impl TypeCodec {
    /// Encode a type identity into its portable string form.
    ///
    /// Deterministic: the same identity always yields the same string.
    pub fn encode(identity: &TypeIdentity) -> Result<String> {
        Ok(serde_json::to_string(identity)?)
    }

    /// Decode a portable string, resolving every name (root and generic
    /// arguments, recursively) against the managed catalog.
    pub fn decode(encoded: &str, catalog: &TypeCatalog) -> Result<TypeIdentity> {
        let identity: TypeIdentity = serde_json::from_str(encoded)
            .map_err(|e| BindingError::Serialization(format!("malformed type encoding: {e}")))?;

        for name in identity.names() {
            if !catalog.is_known_type(name) {
                return Err(BindingError::TypeNotFound(name.to_string()));
            }
        }

        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalogBuilder;
    use crate::handlers::OAuthOptions;

    fn catalog() -> TypeCatalog {
        TypeCatalogBuilder::new()
            .register::<OAuthOptions>(TypeIdentity::new("OAuthHandler"))
            .register::<OAuthOptions>(TypeIdentity::generic(
                "OAuthHandler",
                vec![TypeIdentity::new("GitHubProfile")],
            ))
            .build()
    }

    #[test]
    fn test_encode_omits_empty_args() {
        let identity = TypeIdentity::new("OAuthHandler");
        let encoded = TypeCodec::encode(&identity).unwrap();
        assert_eq!(encoded, r#"{"name":"OAuthHandler"}"#);
    }

    #[test]
    fn test_round_trip_non_generic() {
        let identity = TypeIdentity::new("OAuthHandler");
        let encoded = TypeCodec::encode(&identity).unwrap();
        let decoded = TypeCodec::decode(&encoded, &catalog()).unwrap();
        assert_eq!(decoded, identity);
    }

    #[test]
    fn test_round_trip_generic() {
        let identity = TypeIdentity::generic(
            "OAuthHandler",
            vec![TypeIdentity::new("GitHubProfile")],
        );
        let encoded = TypeCodec::encode(&identity).unwrap();
        let decoded = TypeCodec::decode(&encoded, &catalog()).unwrap();
        assert_eq!(decoded, identity);
        assert!(decoded.is_generic());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let identity = TypeIdentity::new("EvilHandler");
        let encoded = TypeCodec::encode(&identity).unwrap();
        let err = TypeCodec::decode(&encoded, &catalog()).unwrap_err();
        assert!(matches!(err, BindingError::TypeNotFound(name) if name == "EvilHandler"));
    }

    #[test]
    fn test_unknown_generic_argument_rejected() {
        let identity = TypeIdentity::generic(
            "OAuthHandler",
            vec![TypeIdentity::new("UnknownProfile")],
        );
        let encoded = TypeCodec::encode(&identity).unwrap();
        let err = TypeCodec::decode(&encoded, &catalog()).unwrap_err();
        assert!(matches!(err, BindingError::TypeNotFound(name) if name == "UnknownProfile"));
    }

    #[test]
    fn test_malformed_encoding_is_serialization_error() {
        let err = TypeCodec::decode("{oops", &catalog()).unwrap_err();
        assert!(matches!(err, BindingError::Serialization(_)));
    }

    #[test]
    fn test_structural_equality() {
        let a = TypeIdentity::generic("A", vec![TypeIdentity::new("B")]);
        let b = TypeIdentity::generic("A", vec![TypeIdentity::new("B")]);
        let c = TypeIdentity::generic("A", vec![TypeIdentity::new("C")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let identity = TypeIdentity::generic(
            "OAuthHandler",
            vec![TypeIdentity::new("GitHubProfile")],
        );
        assert_eq!(identity.to_string(), "OAuthHandler<GitHubProfile>");
    }
}
