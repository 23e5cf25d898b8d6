//! Driftmix Server - Standalone headless daemon for Driftmix.
//!
//! This binary runs the playback core without a chat front-end: it connects
//! to the audio node, restores persisted guild sessions, and keeps them
//! running. It's designed for deployments where the gateway host runs
//! elsewhere and for soak-testing a node installation.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use driftmix_core::{
    bootstrap_services, BootstrappedServices, EmptyCandidateSource, LoggingNotifier,
    NoopVoiceGateway,
};
use tokio::signal;

use crate::config::ServerConfig;

/// Seconds between node health log lines.
const STATS_LOG_INTERVAL_SECS: u64 = 60;

/// Driftmix Server - Headless per-guild mix playback daemon.
#[derive(Parser, Debug)]
#[command(name = "driftmix-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "DRIFTMIX_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bot user id the node plays on behalf of (overrides config file).
    #[arg(short = 'u', long, env = "DRIFTMIX_USER_ID")]
    user_id: Option<String>,

    /// Node control-plane WebSocket URL (overrides config file).
    #[arg(short = 'n', long, env = "DRIFTMIX_NODE_SOCKET_URL")]
    node_socket_url: Option<String>,

    /// Data directory for persistent state (session snapshots).
    #[arg(short = 'd', long, env = "DRIFTMIX_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Driftmix Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(user_id) = args.user_id {
        config.user_id = user_id;
    }
    if let Some(url) = args.node_socket_url {
        config.node_socket_url = url;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    log::info!(
        "Configuration: node={}, user_id={}, data_dir={}",
        config.node_socket_url,
        config.user_id,
        config
            .data_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "disabled".to_string()),
    );
    if config.user_id == "0" {
        log::warn!(
            "No user id configured; the node will refuse voice sessions. \
             Set DRIFTMIX_USER_ID or user_id in the config file."
        );
    }

    // Bootstrap the playback core. The standalone server has no chat platform
    // attached, so the collaborator seams get their shipping defaults; a
    // gateway host embeds driftmix-core directly and supplies real ones.
    let services = bootstrap_services(
        config.to_core_config(),
        &config.user_id,
        Arc::new(EmptyCandidateSource),
        Arc::new(NoopVoiceGateway),
        Arc::new(LoggingNotifier),
    )
    .await
    .context("Failed to bootstrap services")?;

    log::info!(
        "Services bootstrapped successfully ({} guild session(s) restored)",
        services.registry.len()
    );

    spawn_stats_reporter(&services);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown();

    Ok(())
}

/// Logs a node health line once a minute.
fn spawn_stats_reporter(services: &BootstrappedServices) {
    let node = Arc::clone(&services.node);
    let cancel = services.cancel_token.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(STATS_LOG_INTERVAL_SECS));
        // the first tick completes immediately; skip it so the line reflects
        // a full interval of uptime
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if !node.is_connected() {
                        log::warn!("Node link down, reconnecting in the background");
                        continue;
                    }
                    let stats = node.stats();
                    log::info!(
                        "Node: {}/{} player(s) playing, uptime {}s, node load {:.2}",
                        stats.playing_players,
                        stats.players,
                        stats.uptime / 1000,
                        stats.cpu.lavalink_load,
                    );
                }
            }
        }
    });
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
