//! Core type definitions for Unitgate
//!
//! This module defines the tenant identity derived from a caller's account
//! and the provenance metadata carried by every cached or staged object.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Account prefix that precedes the tenant identifier
pub const ACCOUNT_PREFIX: &str = "AUTH_";

/// Number of identifier characters that make up a tenant scope
pub const TENANT_SCOPE_LEN: usize = 13;

/// Metadata key holding the remote provenance timestamp
pub const TIMESTAMP_KEY: &str = "X-Timestamp";

/// Metadata key naming a function unit's primary entry symbol
pub const MAIN_CLASS_KEY: &str = "X-Object-Meta-Microcontroller-Main";

/// Metadata key listing a function unit's dependencies (comma separated)
pub const DEPENDENCY_KEY: &str = "X-Object-Meta-Microcontroller-Library-Dependency";

/// Per-caller scope partitioning cache and staging directories
///
/// A scope is derived from an account of the form `AUTH_<id>`: it is the
/// first [`TENANT_SCOPE_LEN`] characters of `<id>`. Only ASCII
/// alphanumerics, `-` and `_` are accepted so the scope is always safe to
/// use as a single path component.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct TenantScope(String);

impl TenantScope {
    /// Extract the tenant scope from an account identifier
    pub fn from_account(account: &str) -> Result<Self, TenantScopeError> {
        let id = account
            .strip_prefix(ACCOUNT_PREFIX)
            .ok_or(TenantScopeError::MissingPrefix)?;

        let scope: String = id.chars().take(TENANT_SCOPE_LEN).collect();
        if scope.chars().count() < TENANT_SCOPE_LEN {
            return Err(TenantScopeError::TooShort {
                len: scope.chars().count(),
            });
        }
        if let Some(c) = scope
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return Err(TenantScopeError::InvalidChar(c));
        }

        Ok(Self(scope))
    }

    /// Get the scope as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantScope({:?})", self.0)
    }
}

/// Errors that can occur when deriving a tenant scope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantScopeError {
    #[error("account must start with {}", ACCOUNT_PREFIX)]
    MissingPrefix,
    #[error("account identifier has {len} characters, need at least {}", TENANT_SCOPE_LEN)]
    TooShort { len: usize },
    #[error("account identifier contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// The caller identity for one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tenant {
    /// Full account used when talking to the blob store
    pub account: String,
    /// Scope used to partition local directories
    pub scope: TenantScope,
}

impl Tenant {
    /// Build a tenant from its account identifier
    pub fn from_account(account: impl Into<String>) -> Result<Self, TenantScopeError> {
        let account = account.into();
        let scope = TenantScope::from_account(&account)?;
        Ok(Self { account, scope })
    }
}

/// Provenance metadata attached to a remote object and mirrored locally
///
/// Keys are header names as the blob store reports them. Lookups are
/// case-insensitive because HTTP clients normalise header case differently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectMetadata(BTreeMap<String, String>);

impl ObjectMetadata {
    /// Create empty metadata
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a key, replacing any existing key that differs only in case
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.0.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.0.insert(key, value.into());
    }

    /// Look up a key ignoring ASCII case
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        })
    }

    /// Remote provenance timestamp
    pub fn timestamp(&self) -> Result<f64, MetadataError> {
        let raw = self
            .get(TIMESTAMP_KEY)
            .ok_or(MetadataError::Missing(TIMESTAMP_KEY))?;
        match raw.trim().parse::<f64>() {
            Ok(ts) if ts.is_finite() => Ok(ts),
            _ => Err(MetadataError::Invalid {
                key: TIMESTAMP_KEY,
                value: raw.to_string(),
            }),
        }
    }

    /// Main class of a function unit
    pub fn main_class(&self) -> Result<&str, MetadataError> {
        match self.get(MAIN_CLASS_KEY).map(str::trim) {
            Some(main) if !main.is_empty() => Ok(main),
            Some(main) => Err(MetadataError::Invalid {
                key: MAIN_CLASS_KEY,
                value: main.to_string(),
            }),
            None => Err(MetadataError::Missing(MAIN_CLASS_KEY)),
        }
    }

    /// Ordered dependency names; empty when the key is absent or blank
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        self.get(DEPENDENCY_KEY)
            .map(|deps| {
                deps.split(',')
                    .map(str::trim)
                    .filter(|dep| !dep.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ObjectMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

/// Errors reading a well-known field from [`ObjectMetadata`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
