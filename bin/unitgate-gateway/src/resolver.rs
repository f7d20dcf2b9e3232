//! Dependency resolution
//!
//! Brings every requested function unit, and every library it declares,
//! into the cache and then into the unit's sandbox directory. Dependencies
//! land next to the unit that asked for them, under its main class.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use unitgate_client::BlobStore;
use unitgate_common::{Error, GatewayConfig, ObjectMetadata, Result, Tenant};
use unitgate_storage::{
    CacheSync, Layout, MetadataStore, ObjectLocks, SidecarMetadataStore, Stager,
};

/// Resolves function units and their dependencies for a tenant
pub struct DependencyResolver {
    cache: CacheSync,
    stager: Stager,
    metadata: Arc<dyn MetadataStore>,
    unit_namespace: String,
    dependency_namespace: String,
}

impl DependencyResolver {
    /// Create a resolver over the configured cache and sandbox roots
    pub fn new(config: &GatewayConfig, blob_store: Arc<dyn BlobStore>) -> Self {
        let layout = Arc::new(Layout::from_config(config));
        let metadata: Arc<dyn MetadataStore> = Arc::new(SidecarMetadataStore::new());
        let locks = Arc::new(ObjectLocks::new());

        Self {
            cache: CacheSync::new(
                layout.clone(),
                blob_store,
                metadata.clone(),
                locks.clone(),
                config.refresh_policy,
            ),
            stager: Stager::new(layout, metadata.clone(), locks),
            metadata,
            unit_namespace: config.unit_namespace.clone(),
            dependency_namespace: config.dependency_namespace.clone(),
        }
    }

    /// Cache and stage `unit_names` in order, returning each unit's metadata
    ///
    /// The first failure aborts the remaining list. Work already done is
    /// kept; resolving again re-verifies it.
    pub fn resolve(
        &self,
        tenant: &Tenant,
        unit_names: &[String],
    ) -> Result<BTreeMap<String, ObjectMetadata>> {
        let mut resolved = BTreeMap::new();

        for name in unit_names {
            let path = self
                .cache
                .ensure_cached(tenant, &self.unit_namespace, name)?;
            let metadata = self.metadata.read(&path)?;
            let main_class = metadata
                .main_class()
                .map_err(|e| Error::metadata_unavailable(&path, e))?
                .to_string();

            self.stager
                .stage(&tenant.scope, &main_class, &self.unit_namespace, name)?;

            let dependencies = metadata.dependencies();
            if dependencies.is_empty() {
                debug!("{} has no dependencies", name);
            } else {
                info!("Resolving {} dependencies of {}", dependencies.len(), name);
            }
            for dependency in &dependencies {
                self.cache
                    .ensure_cached(tenant, &self.dependency_namespace, dependency)?;
                self.stager.stage(
                    &tenant.scope,
                    &main_class,
                    &self.dependency_namespace,
                    dependency,
                )?;
            }

            resolved.insert(name.clone(), metadata);
        }

        Ok(resolved)
    }
}
