//! Unitgate Client - External collaborator contracts
//!
//! This crate defines the contracts the gateway consumes and the concrete
//! adapters shipped with it:
//! - Blob store (`HttpBlobStore`, `MemoryBlobStore`)
//! - Sandbox manager (`CommandSandbox`)
//! - Invocation transport (`UnixSocketTransport`)

pub mod blob;
pub mod memory;
pub mod sandbox;
pub mod transport;

// Re-exports
pub use blob::{
    BlobStore, HttpBlobStore, RemoteObject, canonical_header_name, metadata_from_headers,
};
pub use memory::MemoryBlobStore;
pub use sandbox::{CommandSandbox, SandboxManager};
pub use transport::{InvocationContext, InvocationResponse, InvocationTransport};

#[cfg(unix)]
pub use transport::UnixSocketTransport;
