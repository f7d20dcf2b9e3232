//! Unitgate Gateway - Function unit staging and invocation
//!
//! Given a tenant and a list of function units, the gateway:
//! - Makes sure the tenant's sandbox is running
//! - Fetches each unit and its declared libraries into the local cache
//! - Promotes them into the sandbox working directory of the unit
//! - Hands the invocation to the sandbox and returns its answer

pub mod headers;
pub mod orchestrator;
pub mod resolver;

// Re-exports
pub use headers::ObjectHeaders;
pub use orchestrator::Gateway;
pub use resolver::DependencyResolver;
