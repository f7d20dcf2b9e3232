//! Per-tenant object cache
//!
//! Guarantees a local copy of `(namespace, name)` exists, fetching it from
//! the blob store when missing. What happens when a copy is already present
//! is decided by the configured [`RefreshPolicy`]. Freshness of the sandbox
//! copy is checked later, at promotion time.

use crate::layout::{Layout, create_shared_dir, write_atomic};
use crate::lock::{LockKey, ObjectLocks};
use crate::metadata::MetadataStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use unitgate_client::BlobStore;
use unitgate_common::{Error, RefreshPolicy, Result, Tenant};

/// Keeps the local cache in sync with the blob store
pub struct CacheSync {
    layout: Arc<Layout>,
    blob_store: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    locks: Arc<ObjectLocks>,
    policy: RefreshPolicy,
}

impl CacheSync {
    /// Create a cache engine
    pub fn new(
        layout: Arc<Layout>,
        blob_store: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        locks: Arc<ObjectLocks>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            layout,
            blob_store,
            metadata,
            locks,
            policy,
        }
    }

    /// Make sure a cached copy of `(namespace, name)` exists and return its
    /// path
    ///
    /// A failed fetch is not retried; the existing entry, if any, is left
    /// untouched.
    pub fn ensure_cached(&self, tenant: &Tenant, namespace: &str, name: &str) -> Result<PathBuf> {
        let path = self.layout.cache_path(&tenant.scope, namespace, name)?;
        let _guard = self
            .locks
            .lock(LockKey::cached(&tenant.scope, namespace, name));

        if !path.is_file() {
            info!("{}/{} not found in cache", namespace, name);
            self.fetch(tenant, namespace, name, &path)?;
            return Ok(path);
        }

        match self.policy {
            RefreshPolicy::Always => {
                debug!("{}/{} in cache, refreshing", namespace, name);
                self.fetch(tenant, namespace, name, &path)?;
            }
            RefreshPolicy::OnMiss => {
                debug!("{}/{} in cache", namespace, name);
            }
            RefreshPolicy::Revalidate => {
                if self.is_stale(tenant, namespace, name, &path)? {
                    info!("{}/{} in cache but stale", namespace, name);
                    self.fetch(tenant, namespace, name, &path)?;
                } else {
                    debug!("{}/{} in cache and current", namespace, name);
                }
            }
        }
        Ok(path)
    }

    /// Compare the cached timestamp with the blob store's
    fn is_stale(&self, tenant: &Tenant, namespace: &str, name: &str, path: &Path) -> Result<bool> {
        let remote = self
            .blob_store
            .head_object(&tenant.account, namespace, name)?
            .timestamp()
            .map_err(|e| Error::remote_fetch(namespace, name, e))?;

        let local = match self.metadata.read(path) {
            Ok(metadata) => metadata.timestamp(),
            Err(e) => {
                warn!("Refetching {}/{}: {}", namespace, name, e);
                return Ok(true);
            }
        };

        Ok(local.map_or(true, |local| remote > local))
    }

    /// Download payload and metadata, payload first
    fn fetch(&self, tenant: &Tenant, namespace: &str, name: &str, path: &Path) -> Result<()> {
        let object = self.blob_store.get_object(&tenant.account, namespace, name)?;

        // The cache never invents a timestamp, so the remote one must be usable
        object
            .metadata
            .timestamp()
            .map_err(|e| Error::remote_fetch(namespace, name, e))?;

        if let Some(dir) = path.parent() {
            create_shared_dir(dir)?;
        }
        write_atomic(path, &object.body)?;
        self.metadata.write(path, &object.metadata)?;

        info!(
            "Cached {}/{} for {} ({} bytes)",
            namespace,
            name,
            tenant.scope,
            object.body.len()
        );
        Ok(())
    }
}
