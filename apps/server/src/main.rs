//! Radiocast Server - Standalone headless server for Radiocast.
//!
//! This binary wires the broadcast engine to an HTTP surface: it scans the
//! media directory into a playlist, starts the producer, and serves the
//! audio stream plus both metadata channels until a shutdown signal arrives.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use radiocast_core::{
    start_server, AppState, AudioBroadcaster, BroadcastEngine, Playlist, TrackSource,
};
use tokio::signal;

use crate::config::ServerConfig;

/// Radiocast Server - Headless internet-radio broadcaster.
#[derive(Parser, Debug)]
#[command(name = "radiocast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RADIOCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "RADIOCAST_BIND_PORT")]
    port: Option<u16>,

    /// Media directory scanned for `.mp3` files (overrides config file).
    #[arg(short = 'm', long, env = "RADIOCAST_MEDIA_DIR")]
    media_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Radiocast Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }

    log::info!(
        "Configuration: bind_port={}, media_dir={}",
        config.bind_port,
        config.media_dir.display()
    );

    let core_config = config.to_core_config();
    core_config
        .streaming
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid streaming configuration")?;

    // Build the core: playlist -> broadcaster -> engine
    let heartbeat = Duration::from_secs(core_config.heartbeat_interval_secs);
    let playlist = Arc::new(
        Playlist::load(&core_config.media_dir, heartbeat).context("Failed to load playlist")?,
    );
    if playlist.is_empty() {
        log::warn!(
            "No tracks found in {} - listeners will hear nothing until files appear and a reload runs",
            core_config.media_dir.display()
        );
    }

    let broadcaster = Arc::new(AudioBroadcaster::new(heartbeat));
    let engine = Arc::new(BroadcastEngine::new(
        Arc::clone(&broadcaster),
        Duration::from_millis(core_config.busy_wait_ceiling_ms),
    ));

    engine.start(Arc::clone(&playlist) as Arc<dyn TrackSource>);
    log::info!("Broadcast engine started");

    // Build app state for the HTTP server
    let app_state = AppState::new(
        Arc::clone(&engine),
        broadcaster,
        playlist,
        Arc::new(RwLock::new(core_config)),
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: stop the producer, then drop the HTTP server
    engine.shutdown().await;
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
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
