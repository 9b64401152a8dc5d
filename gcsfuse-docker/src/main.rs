mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libvolume::{Logging, PluginServer, Registry};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Cli;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM, only ctrl-c will stop the plugin");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = term.recv() => info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let profile = cli.driver_profile();
    info!(
        root = %cli.root.display(),
        required = ?profile.required_keys(),
        operations = ?profile.operations,
        "starting gcsfuse volume plugin",
    );

    tokio::fs::create_dir_all(&cli.root)
        .await
        .with_context(|| format!("Failed to create volume root at {:?}", cli.root))?;

    let registry = Registry::new(
        cli.root.clone(),
        cli.key_file.clone(),
        profile,
        Arc::new(cli.executor()),
    );
    let driver = Arc::new(Logging::new(Arc::new(registry)));

    let socket = cli.socket_path();
    let server = PluginServer::bind(&socket, cli.socket_gid, driver)
        .with_context(|| format!("Error serving {}", socket.display()))?;

    server
        .serve_until(shutdown_signal())
        .await
        .context("Plugin server failed")?;
    Ok(())
}
