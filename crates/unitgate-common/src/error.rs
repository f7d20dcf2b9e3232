//! Error types for Unitgate
//!
//! This module defines the common error types used throughout the system.
//! Nothing in Unitgate retries internally: every variant aborts the current
//! request and is surfaced to the caller.

use crate::types::TenantScopeError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Common result type for Unitgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Unitgate
#[derive(Debug, Error)]
pub enum Error {
    // Blob store errors
    #[error("remote fetch failed for {container}/{name}: {reason}")]
    RemoteFetchFailed {
        container: String,
        name: String,
        reason: String,
    },

    // Local cache / staging errors
    #[error("metadata unavailable for {}: {reason}", path.display())]
    MetadataUnavailable { path: PathBuf, reason: String },

    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    // Sandbox errors
    #[error("sandbox for {scope} unavailable: {reason}")]
    SandboxUnavailable { scope: String, reason: String },

    // Invocation transport errors
    #[error("invocation timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    // Request errors
    #[error("invalid tenant: {0}")]
    InvalidTenant(#[from] TenantScopeError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a remote fetch error
    pub fn remote_fetch(
        container: impl Into<String>,
        name: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::RemoteFetchFailed {
            container: container.into(),
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a metadata unavailable error
    pub fn metadata_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MetadataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl ToString) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RemoteFetchFailed { .. } | Self::MetadataUnavailable { .. }
        )
    }

    /// Get HTTP status code for the surrounding request pipeline
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidTenant(_) | Self::InvalidArgument(_) => 400,

            // 404 Not Found
            Self::RemoteFetchFailed { .. } => 404,

            // 500 Internal Server Error
            Self::MetadataUnavailable { .. }
            | Self::DiskIo(_)
            | Self::Configuration(_)
            | Self::Serialization(_) => 500,

            // 502 Bad Gateway
            Self::Transport(_) => 502,

            // 503 Service Unavailable
            Self::SandboxUnavailable { .. } => 503,

            // 504 Gateway Timeout
            Self::TransportTimeout(_) => 504,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
