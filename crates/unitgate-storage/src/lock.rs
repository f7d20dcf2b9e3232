//! Per-object lock keys
//!
//! Concurrent requests for the same tenant may fetch or promote the same
//! object at once. A cache entry is keyed by its namespace, a staged file by
//! the main-class directory it lands in, so a unit and a dependency sharing
//! a name still exclude each other at the destination. Holding the key for
//! the whole "payload, then metadata" sequence keeps each payload paired
//! with its own metadata within this process. Other processes writing the
//! same directories are not covered.
//!
//! Lock order: a cache key is always taken before a staged key.

use unitgate_common::{KeyedLocks, TenantScope};

/// Locks shared by the cache and staging engines
pub type ObjectLocks = KeyedLocks<LockKey>;

/// Which tree a key refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Area {
    Cache,
    Stage,
}

/// Identifies one file of one tenant
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub area: Area,
    pub scope: TenantScope,
    /// Namespace for cache entries, main class for staged files
    pub dir: String,
    pub name: String,
}

impl LockKey {
    /// Key of the cache entry `(namespace, name)`
    pub fn cached(scope: &TenantScope, namespace: &str, name: &str) -> Self {
        Self::new(Area::Cache, scope, namespace, name)
    }

    /// Key of the staged file `name` under `main_class`
    pub fn staged(scope: &TenantScope, main_class: &str, name: &str) -> Self {
        Self::new(Area::Stage, scope, main_class, name)
    }

    fn new(area: Area, scope: &TenantScope, dir: &str, name: &str) -> Self {
        Self {
            area,
            scope: scope.clone(),
            dir: dir.to_string(),
            name: name.to_string(),
        }
    }
}
