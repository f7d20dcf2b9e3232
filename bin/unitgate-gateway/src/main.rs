//! Unitgate Gateway - Command line driver
//!
//! Runs the gateway against a configured blob store and sandbox, outside
//! of any request pipeline. Results are printed as JSON.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use http::{HeaderName, HeaderValue, Method, Request};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unitgate_client::{CommandSandbox, HttpBlobStore, UnixSocketTransport};
use unitgate_common::{GatewayConfig, RefreshPolicy, Tenant};
use unitgate_gateway::{DependencyResolver, Gateway};

#[derive(Parser, Debug)]
#[command(name = "unitgate-gateway")]
#[command(about = "Unitgate function unit gateway")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML, optional)
    #[arg(short, long, default_value = "/etc/unitgate/gateway.toml")]
    config: PathBuf,

    /// Cache directory root
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Sandbox working directory root
    #[arg(long)]
    stage_dir: Option<PathBuf>,

    /// Blob store endpoint, e.g. http://127.0.0.1:8080/v1
    #[arg(long, env = "UNITGATE_BLOB_ENDPOINT")]
    blob_endpoint: Option<String>,

    /// Blob store auth token
    #[arg(long, env = "UNITGATE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Cache refresh policy: always, on_miss, revalidate
    #[arg(long)]
    refresh_policy: Option<String>,

    /// Invocation timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stage units and run them in the tenant's sandbox
    Invoke {
        /// Account, e.g. AUTH_4f0279da74ef4584a29dc72c835fe2c9
        account: String,
        /// Function units to run, in order
        #[arg(required = true)]
        units: Vec<String>,
        /// Method of the request being served
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// URI of the request being served
        #[arg(short, long, default_value = "/")]
        uri: String,
        /// Request header as `Name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Cache and stage units without starting the sandbox
    Prefetch {
        /// Account, e.g. AUTH_4f0279da74ef4584a29dc72c835fe2c9
        account: String,
        /// Function units to stage, in order
        #[arg(required = true)]
        units: Vec<String>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Arc::new(load_config(&args)?);
    info!("Cache directory: {}", config.cache_dir.display());
    info!("Sandbox directory: {}", config.stage_dir.display());
    info!("Blob store: {}", config.blob_store.endpoint);

    let blob_store = Arc::new(HttpBlobStore::new(&config.blob_store)?);
    let resolver = DependencyResolver::new(&config, blob_store);

    match args.command {
        Commands::Prefetch { account, units } => {
            let tenant = Tenant::from_account(account)?;
            let resolved = resolver.resolve(&tenant, &units)?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Commands::Invoke {
            account,
            units,
            method,
            uri,
            headers,
        } => {
            let gateway = Gateway::new(
                config.clone(),
                resolver,
                Arc::new(CommandSandbox::new(config.clone())),
                Arc::new(UnixSocketTransport::new()),
            );
            let request = build_request(&method, &uri, &headers)?;
            let response = gateway.execute(&account, &request, None, &units)?;
            println!("{}", serde_json::to_string_pretty(&response.body)?);
        }
    }

    Ok(())
}

/// Defaults, then the config file, then `UNITGATE__*` variables, then flags
fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config: GatewayConfig = config::Config::builder()
        .add_source(config::File::from(args.config.clone()).required(false))
        .add_source(config::Environment::with_prefix("UNITGATE").separator("__"))
        .build()
        .context("Failed to load configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    if let Some(dir) = &args.cache_dir {
        config.cache_dir.clone_from(dir);
    }
    if let Some(dir) = &args.stage_dir {
        config.stage_dir.clone_from(dir);
    }
    if let Some(endpoint) = &args.blob_endpoint {
        config.blob_store.endpoint.clone_from(endpoint);
    }
    if let Some(token) = &args.auth_token {
        config.blob_store.auth_token = Some(token.clone());
    }
    if let Some(policy) = &args.refresh_policy {
        config.refresh_policy = parse_refresh_policy(policy)?;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }

    config.validate()?;
    Ok(config)
}

fn parse_refresh_policy(value: &str) -> Result<RefreshPolicy> {
    Ok(match value.to_ascii_lowercase().replace('-', "_").as_str() {
        "always" => RefreshPolicy::Always,
        "on_miss" => RefreshPolicy::OnMiss,
        "revalidate" => RefreshPolicy::Revalidate,
        other => bail!("unknown refresh policy: {other}"),
    })
}

fn build_request(method: &str, uri: &str, headers: &[String]) -> Result<http::request::Parts> {
    let mut builder = Request::builder()
        .method(Method::from_bytes(method.to_ascii_uppercase().as_bytes())?)
        .uri(uri);

    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header must be `Name: value`, got {header:?}"))?;
        builder = builder.header(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }

    Ok(builder.body(())?.into_parts().0)
}
