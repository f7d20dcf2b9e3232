//! Gateway orchestration
//!
//! One call to [`Gateway::execute`] handles one inbound request: start the
//! tenant's sandbox, bring the requested units up to date in it, then hand
//! the invocation to the transport and return whatever comes back.

use crate::headers;
use crate::resolver::DependencyResolver;
use http::{HeaderMap, request};
use std::sync::Arc;
use tracing::info;
use unitgate_client::{InvocationContext, InvocationResponse, InvocationTransport, SandboxManager};
use unitgate_common::{GatewayConfig, Result, Tenant};

/// Entry point consumed by the request pipeline
pub struct Gateway {
    config: Arc<GatewayConfig>,
    resolver: DependencyResolver,
    sandbox: Arc<dyn SandboxManager>,
    transport: Arc<dyn InvocationTransport>,
}

impl Gateway {
    pub fn new(
        config: Arc<GatewayConfig>,
        resolver: DependencyResolver,
        sandbox: Arc<dyn SandboxManager>,
        transport: Arc<dyn InvocationTransport>,
    ) -> Self {
        Self {
            config,
            resolver,
            sandbox,
            transport,
        }
    }

    /// Run `unit_names` for `account` on behalf of an inbound request
    ///
    /// `response` holds the upstream response headers when the request has
    /// already been served, as for a read. Every failure is returned to the
    /// caller unchanged.
    pub fn execute(
        &self,
        account: &str,
        request: &request::Parts,
        response: Option<&HeaderMap>,
        unit_names: &[String],
    ) -> Result<InvocationResponse> {
        let tenant = Tenant::from_account(account)?;

        self.sandbox.start(&tenant.scope)?;
        let unit_metadata = self.resolver.resolve(&tenant, unit_names)?;
        let object_headers = headers::extract(request, response);

        let context = InvocationContext {
            pipe_path: self.config.pipe_path(&tenant.scope),
            log_path: self.config.log_path(&tenant.scope),
            request_headers: headers::flatten(&request.headers),
            object_headers: object_headers.headers,
            referer: object_headers.referer,
            unit_names: unit_names.to_vec(),
            unit_metadata,
            timeout: self.config.timeout(),
        };

        info!(
            "Invoking {:?} for {} via {}",
            unit_names,
            tenant.scope,
            context.pipe_path.display()
        );
        self.transport.communicate(&context)
    }
}
