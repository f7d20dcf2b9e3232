//! Unitgate Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, the gateway configuration and
//! the small value types (tenant scope, object metadata) used by every
//! Unitgate component, plus the keyed lock shared by the sandbox launcher
//! and the storage engines.

pub mod config;
pub mod error;
pub mod lock;
pub mod types;

pub use config::{BlobStoreConfig, GatewayConfig, RefreshPolicy, SandboxConfig};
pub use error::{Error, Result};
pub use lock::{KeyGuard, KeyedLocks};
pub use types::*;
