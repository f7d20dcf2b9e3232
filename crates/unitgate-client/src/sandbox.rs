//! Sandbox manager
//!
//! A tenant's sandbox is considered running once its invocation pipe
//! exists. Starting is idempotent: a running sandbox is left alone.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use unitgate_common::{Error, GatewayConfig, KeyedLocks, Result, TenantScope};

/// Starts isolated execution environments
pub trait SandboxManager: Send + Sync {
    /// Ensure the sandbox for `scope` is running, blocking until it is
    /// ready or has failed
    fn start(&self, scope: &TenantScope) -> Result<()>;
}

/// Sandbox manager that launches an external program per tenant
pub struct CommandSandbox {
    config: Arc<GatewayConfig>,
    ready_timeout: Duration,
    poll_interval: Duration,
    /// Held per tenant while its sandbox is being launched
    launching: KeyedLocks<TenantScope>,
}

impl CommandSandbox {
    /// Create a sandbox manager from the gateway configuration
    ///
    /// Without a configured command the sandbox is assumed to be managed
    /// elsewhere and `start` only checks that it is running.
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let ready_timeout = Duration::from_secs(config.sandbox.ready_timeout_secs);
        Self {
            config,
            ready_timeout,
            poll_interval: Duration::from_millis(50),
            launching: KeyedLocks::new(),
        }
    }

    /// Override how long to wait for a launched sandbox
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn pipe_path(&self, scope: &TenantScope) -> PathBuf {
        self.config.pipe_path(scope)
    }

    /// Check whether the tenant's sandbox has opened its pipe
    pub fn is_running(&self, scope: &TenantScope) -> bool {
        self.pipe_path(scope).exists()
    }

    fn launch(&self, scope: &TenantScope) -> Result<()> {
        let Some(program) = &self.config.sandbox.command else {
            return Err(unavailable(scope, "not running and no launcher configured"));
        };

        info!("Starting sandbox for {} with {}", scope, program.display());
        let status = Command::new(program)
            .args(&self.config.sandbox.args)
            .arg(scope.as_str())
            .status()
            .map_err(|e| unavailable(scope, format!("failed to run launcher: {e}")))?;

        if !status.success() {
            warn!("Sandbox launcher for {} exited with {}", scope, status);
            return Err(unavailable(scope, format!("launcher exited with {status}")));
        }

        self.wait_ready(scope)
    }

    fn wait_ready(&self, scope: &TenantScope) -> Result<()> {
        let deadline = Instant::now() + self.ready_timeout;
        while !self.is_running(scope) {
            if Instant::now() >= deadline {
                return Err(unavailable(
                    scope,
                    format!("pipe not ready after {:?}", self.ready_timeout),
                ));
            }
            thread::sleep(self.poll_interval);
        }
        info!("Sandbox for {} is ready", scope);
        Ok(())
    }
}

impl SandboxManager for CommandSandbox {
    fn start(&self, scope: &TenantScope) -> Result<()> {
        if self.is_running(scope) {
            debug!("Sandbox for {} already running", scope);
            return Ok(());
        }

        let _guard = self.launching.lock(scope.clone());
        if self.is_running(scope) {
            return Ok(());
        }
        self.launch(scope)
    }
}

fn unavailable(scope: &TenantScope, reason: impl Into<String>) -> Error {
    Error::SandboxUnavailable {
        scope: scope.to_string(),
        reason: reason.into(),
    }
}
