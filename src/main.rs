//! rcserver - HTTP remote control front end
//!
//! Exposes a registry of named operations over HTTP POST (run inline or as
//! background jobs) and, optionally, a browser over configured storage
//! remotes plus a static file directory on GET.

mod auth;
mod config;
mod errors;
mod metrics;
mod rc;
mod routes;
mod server;
mod storage;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::rc::{JobQueue, Registry};
use crate::routes::AppState;
use crate::server::Server;
use crate::storage::RemoteCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment and optional config file
    let config = Config::from_env()?;

    // Initialize tracing with JSON output for structured logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    metrics::init_metrics().context("failed to register metrics")?;

    info!(
        bind_address = %config.server.bind_address,
        serve = config.rc.serve,
        remotes = config.remotes.len(),
        auth = config.rc.using_auth(),
        "Configuration loaded"
    );
    if !config.rc.enabled {
        info!("Remote control disabled, exiting");
        return Ok(());
    }

    let jobs = JobQueue::new(config.rc.max_jobs)
        .with_expiry(Duration::from_secs(config.rc.job_expire_secs));
    let mut registry = Registry::new();
    rc::builtin::register(&mut registry, jobs.clone());
    info!(calls = registry.len(), "Operations registered");

    let state = AppState {
        opts: Arc::new(config.rc.clone()),
        registry: Arc::new(registry),
        scheduler: Arc::new(jobs),
        remotes: Arc::new(RemoteCache::new(config.remotes.clone())),
        max_body_size: config.server.max_body_size,
    };
    let server = Server::new(config, state);

    // Handle graceful shutdown
    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    };

    if let Err(e) = server.start(shutdown_signal).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
