//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Build the tenant resolver and the proxy
//! - Start the config reload task
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::{load_config, validate_config, ConfigError, ConfigWatcher, ProxyConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};
use crate::proxy::{HttpTransport, Proxy};
use crate::routing::{StaticResolver, TenantTable};

/// Command line of the `tenant-proxy` binary.
#[derive(Debug, Parser)]
#[command(name = "tenant-proxy")]
#[command(about = "Multi-tenant shaping reverse proxy", long_about = None)]
pub struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Fatal errors during startup or serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Effective configuration: file (or defaults) plus command line overrides.
pub fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Build the proxy for a validated configuration.
pub fn build_proxy(config: &ProxyConfig, resolver: Arc<StaticResolver>) -> Proxy {
    Proxy::builder(resolver)
        .transport(HttpTransport::new(Duration::from_secs(config.timeouts.connect_secs)))
        .max_body_bytes(config.body.max_bytes)
        .build()
}

/// Run the proxy until SIGINT/SIGTERM.
pub async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = resolve_config(&cli)?;
    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tenant-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tenants = config.tenants.len(),
        request_timeout_secs = config.timeouts.request_secs,
        max_body_bytes = config.body.max_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let resolver = Arc::new(StaticResolver::from_config(&config));
    let _watcher = match &cli.config {
        Some(path) => Some(spawn_reload(path, resolver.clone(), shutdown.subscribe())?),
        None => None,
    };

    let proxy = build_proxy(&config, resolver);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, proxy);
    let serving = server.run(listener, shutdown.signalled());
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });
    serving.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Swap the tenant table whenever the config file changes.
fn spawn_reload(
    path: &Path,
    resolver: Arc<StaticResolver>,
    mut stop: broadcast::Receiver<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let guard = watcher.run()?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => resolver.replace(TenantTable::from_entries(&config.tenants)),
                    None => break,
                },
                _ = stop.recv() => break,
            }
        }
        tracing::debug!("Config reload task stopped");
    });
    Ok(guard)
}
