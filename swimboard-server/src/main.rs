//! Swimboard server — live swimming-scoreboard core.
//!
//! Decodes serial timing data via a supervised listener process, resolves
//! meet metadata, maintains the authoritative scoreboard state and
//! broadcasts full snapshots to every connected display.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use swimboard_broadcaster::SnapshotHub;
use swimboard_server::config::ServerConfig;
use swimboard_server::engine::RaceEngine;
use swimboard_server::ipc::ControlServer;
use swimboard_server::listener::ListenerSupervisor;

#[derive(Debug, Parser)]
#[command(name = "swimboard-server", version, about = "Swimming scoreboard server")]
struct Args {
    /// Configuration file (default: platform config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Unix socket publishing scoreboard snapshots.
    #[arg(long, default_value = "/tmp/swimboard_state.sock")]
    snapshot_socket: PathBuf,

    /// Unix socket accepting control commands.
    #[arg(long, default_value = "/tmp/swimboard.sock")]
    control_socket: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    info!("Starting swimboard server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load(args.config).context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config.config_path.display());
    let timing = config.timing.clone();

    let hub = Arc::new(SnapshotHub::new(&args.snapshot_socket));
    hub.start().await.context("Failed to start snapshot hub")?;

    let supervisor = ListenerSupervisor::new();
    let engine = RaceEngine::new(config, Arc::clone(&hub), Arc::clone(&supervisor));

    // Seed subscribers with the restored state before anything can connect.
    engine.publish_current().await;

    engine.restart_meet_watcher();

    // The scoreboard must stay usable with no timing system attached, so a
    // listener that cannot start is only a warning.
    if let Err(err) = supervisor.apply(&timing, Arc::clone(&engine)).await {
        warn!(error = %err, "serial listener not started");
    }

    let control = ControlServer::bind(&args.control_socket, Arc::clone(&engine))
        .context("Failed to start control server")?;

    info!("Swimboard server ready");

    tokio::select! {
        result = control.run() => {
            if let Err(err) = result {
                error!(error = %err, "control server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    supervisor.stop().await;
    if let Err(err) = hub.stop().await {
        warn!(error = %err, "snapshot hub shutdown incomplete");
    }
    let _ = std::fs::remove_file(&args.control_socket);
    info!("Swimboard server stopped");

    Ok(())
}
