//! netheal daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;

mod config;
mod coordinator;
mod decoder;
mod detector;
mod error;
mod policy;
mod reconcile;
mod records;
mod runtime;
mod server;
mod sidecar;
mod types;

#[cfg(test)]
mod testing;

use config::Config;
use coordinator::HttpPeerClient;
use reconcile::Reconciler;
use runtime::DockerRuntime;
use server::{run_server, ServerState};
use sidecar::HttpSidecar;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting netheal with config: {:?}", cfg);

    let runtime = Arc::new(DockerRuntime::connect(cfg.docker_cli.clone())?);

    // Switch on the network diagnostic server; without it nothing can be repaired.
    if cfg.prepare_diagnostic_sidecar {
        if let Err(e) = runtime
            .prepare_diagnostic_sidecar(&cfg.diagnostic_sidecar_image)
            .await
        {
            error!("Failed to enable the network diagnostic server: {}", e);
            std::process::exit(1);
        }
    }

    let sidecar = Arc::new(HttpSidecar::new(&cfg)?);
    let peers = Arc::new(HttpPeerClient::new(&cfg)?);

    // Peer RPC + liveness
    let state = ServerState {
        runtime: runtime.clone(),
        sidecar: sidecar.clone(),
        peers: peers.clone(),
        strategy: cfg.repair_strategy,
    };
    let port = cfg.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = run_server(port, state).await {
            error!("Peer RPC server failed: {}", e);
        }
    });

    // Reconciliation loop
    let reconciler = Reconciler::new(
        runtime,
        sidecar,
        peers,
        cfg.repair_strategy,
        cfg.check_interval(),
    );
    let loop_handle = tokio::spawn(async move { reconciler.run().await });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    loop_handle.abort();
    server_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
