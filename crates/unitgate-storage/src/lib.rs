//! Unitgate Storage - Local cache and sandbox staging
//!
//! This crate implements the on-disk half of the gateway:
//! - Sidecar provenance metadata for cached and staged files
//! - Per-tenant cache synchronization from the blob store
//! - Timestamp-gated promotion into sandbox working directories
//! - Per-object locking shared by both engines

pub mod cache;
pub mod layout;
pub mod lock;
pub mod metadata;
pub mod stage;

// Re-exports
pub use cache::CacheSync;
pub use layout::Layout;
pub use lock::{Area, LockKey, ObjectLocks};
pub use metadata::{MetadataStore, SidecarMetadataStore};
pub use stage::{StageOutcome, Stager};
