//! Provenance metadata attached to files on disk
//!
//! Every cached or staged payload carries the metadata of the remote object
//! it came from. The store has no cache of its own: each call reflects the
//! on-disk state at that moment.

use crate::layout::write_atomic;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use unitgate_common::{Error, ObjectMetadata, Result};

/// Reads and writes metadata attached to a local file
pub trait MetadataStore: Send + Sync {
    /// Read the metadata attached to `path`
    ///
    /// Fails with `MetadataUnavailable` if the file does not exist or its
    /// metadata is absent or corrupt.
    fn read(&self, path: &Path) -> Result<ObjectMetadata>;

    /// Attach `metadata` to `path`, replacing what was there
    fn write(&self, path: &Path, metadata: &ObjectMetadata) -> Result<()>;
}

/// Metadata kept as JSON in a hidden sidecar next to the payload
#[derive(Clone, Copy, Debug, Default)]
pub struct SidecarMetadataStore;

impl SidecarMetadataStore {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// `dir/name` keeps its metadata in `dir/.name.meta.json`
#[must_use]
pub fn sidecar_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.meta.json"))
}

impl MetadataStore for SidecarMetadataStore {
    fn read(&self, path: &Path) -> Result<ObjectMetadata> {
        if !path.is_file() {
            return Err(Error::metadata_unavailable(path, "no such file"));
        }

        let raw = match fs::read(sidecar_path(path)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::metadata_unavailable(path, "no metadata attached"));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw)
            .map_err(|e| Error::metadata_unavailable(path, format!("corrupt metadata: {e}")))
    }

    fn write(&self, path: &Path, metadata: &ObjectMetadata) -> Result<()> {
        if !path.is_file() {
            return Err(Error::metadata_unavailable(path, "no such file"));
        }

        let raw = serde_json::to_vec(metadata)?;
        write_atomic(&sidecar_path(path), &raw)?;
        Ok(())
    }
}
