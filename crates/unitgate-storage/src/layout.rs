//! On-disk layout of the cache and staging areas
//!
//! Layout:
//! ```text
//! {cache_dir}/{tenant_scope}/{namespace}/{name}              cached payload
//! {cache_dir}/{tenant_scope}/{namespace}/.{name}.meta.json   cached metadata
//! {stage_dir}/{tenant_scope}/{main_class}/{name}             staged payload
//! {stage_dir}/{tenant_scope}/{main_class}/.{name}.meta.json  staged metadata
//! ```
//!
//! Dependencies are staged next to the function unit that requested them,
//! under that unit's main-class directory.

use std::fs::{self, File, FileTimes};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use unitgate_common::{Error, GatewayConfig, Result, TenantScope};

/// Mode for directories shared with the out-of-process sandbox
pub const SHARED_DIR_MODE: u32 = 0o777;

/// Path computation for cache and staging entries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    cache_dir: PathBuf,
    stage_dir: PathBuf,
}

impl Layout {
    /// Create a layout from its two roots
    pub fn new(cache_dir: impl Into<PathBuf>, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            stage_dir: stage_dir.into(),
        }
    }

    /// Create a layout from the gateway configuration
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(&config.cache_dir, &config.stage_dir)
    }

    /// Cached payload of `(namespace, name)` for a tenant
    pub fn cache_path(&self, scope: &TenantScope, namespace: &str, name: &str) -> Result<PathBuf> {
        Ok(self
            .cache_dir
            .join(scope.as_str())
            .join(component("namespace", namespace)?)
            .join(component("object name", name)?))
    }

    /// Sandbox working directory of a main class for a tenant
    pub fn stage_dir(&self, scope: &TenantScope, main_class: &str) -> Result<PathBuf> {
        Ok(self
            .stage_dir
            .join(scope.as_str())
            .join(component("main class", main_class)?))
    }

    /// Staged payload of `name` under a main class
    pub fn stage_path(&self, scope: &TenantScope, main_class: &str, name: &str) -> Result<PathBuf> {
        Ok(self
            .stage_dir(scope, main_class)?
            .join(component("object name", name)?))
    }
}

/// Reject anything that is not a single, normal path component
///
/// Dot-prefixed names are reserved for metadata sidecars and temporary
/// files living next to the payloads.
fn component<'a>(kind: &str, value: &'a str) -> Result<&'a str> {
    let invalid = value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::invalid_argument(format!("invalid {kind}: {value:?}")));
    }
    Ok(value)
}

/// Create a directory (and parents) readable and writable by the sandbox
pub fn create_shared_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(SHARED_DIR_MODE);
    }
    builder.create(path)
}

/// Hidden sibling used to build a file before renaming it into place
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

/// Replace `path` with `data` in a single rename
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = temp_path(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Copy `src` over `dest`, keeping permissions and access/modification
/// times, in a single rename
pub(crate) fn copy_preserving(src: &Path, dest: &Path) -> io::Result<()> {
    let tmp = temp_path(dest);
    let result = (|| {
        fs::copy(src, &tmp)?;
        let source = fs::metadata(src)?;
        let times = FileTimes::new()
            .set_accessed(source.accessed()?)
            .set_modified(source.modified()?);
        File::options().write(true).open(&tmp)?.set_times(times)?;
        fs::rename(&tmp, dest)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
