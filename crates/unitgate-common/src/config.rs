//! Configuration types for Unitgate
//!
//! The gateway owns none of this configuration: it is loaded by the binary
//! and handed to each component's constructor.

use crate::error::{Error, Result};
use crate::types::TenantScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the gateway
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Root of the per-tenant object cache
    pub cache_dir: PathBuf,
    /// Root of the sandbox working directories
    pub stage_dir: PathBuf,
    /// Root of the per-tenant invocation logs
    pub log_dir: PathBuf,
    /// Root of the per-tenant transport pipes
    pub pipes_dir: PathBuf,
    /// File name of the invocation pipe inside a tenant's pipe directory
    pub pipe_name: String,
    /// Invocation timeout (seconds)
    pub timeout_secs: u64,
    /// Blob store container holding function units
    pub unit_namespace: String,
    /// Blob store container holding dependencies
    pub dependency_namespace: String,
    /// When a present cache entry is refetched
    pub refresh_policy: RefreshPolicy,
    /// Blob store connection
    pub blob_store: BlobStoreConfig,
    /// Sandbox launcher
    pub sandbox: SandboxConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/unitgate"),
            stage_dir: PathBuf::from("/var/lib/unitgate/sandbox"),
            log_dir: PathBuf::from("/var/log/unitgate"),
            pipes_dir: PathBuf::from("/run/unitgate/pipes"),
            pipe_name: "invocation_pipe".to_string(),
            timeout_secs: 20,
            unit_namespace: "units".to_string(),
            dependency_namespace: "dependencies".to_string(),
            refresh_policy: RefreshPolicy::default(),
            blob_store: BlobStoreConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a config rooted in a single directory (tests, local runs)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join("cache"),
            stage_dir: root.join("sandbox"),
            log_dir: root.join("logs"),
            pipes_dir: root.join("pipes"),
            ..Default::default()
        }
    }

    /// Invocation timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Path of the invocation pipe for a tenant
    #[must_use]
    pub fn pipe_path(&self, scope: &TenantScope) -> PathBuf {
        self.pipes_dir.join(scope.as_str()).join(&self.pipe_name)
    }

    /// Path of the invocation log destination for a tenant
    #[must_use]
    pub fn log_path(&self, scope: &TenantScope) -> PathBuf {
        self.log_dir.join(scope.as_str())
    }

    /// Check the configuration for values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.unit_namespace.trim().is_empty() || self.dependency_namespace.trim().is_empty() {
            return Err(Error::Configuration("namespaces must not be empty".into()));
        }
        if self.unit_namespace == self.dependency_namespace {
            return Err(Error::Configuration(format!(
                "unit and dependency namespaces must differ (both are {:?})",
                self.unit_namespace
            )));
        }
        if self.pipe_name.is_empty() || self.pipe_name.contains('/') {
            return Err(Error::Configuration(format!(
                "invalid pipe name: {:?}",
                self.pipe_name
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Configuration("timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Policy applied by the cache when an entry is already present
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Refetch on every request, present or not
    #[default]
    Always,
    /// Fetch only when the entry is absent
    OnMiss,
    /// Ask the blob store for the current timestamp; refetch when newer
    Revalidate,
}

/// Blob store connection configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080/v1`
    pub endpoint: String,
    /// Token sent as `X-Auth-Token`
    pub auth_token: Option<String>,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

/// Sandbox launcher configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Program started when a tenant's sandbox is not running
    pub command: Option<PathBuf>,
    /// Arguments passed before the tenant scope
    pub args: Vec<String>,
    /// How long to wait for the sandbox to open its pipe (seconds)
    pub ready_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            ready_timeout_secs: 30,
        }
    }
}
