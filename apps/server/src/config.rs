//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = probe a small range).
    /// Override: `RADIOCAST_BIND_PORT`
    pub bind_port: u16,

    /// Directory scanned for `.mp3` files.
    /// Override: `RADIOCAST_MEDIA_DIR`
    pub media_dir: PathBuf,

    /// Per-listener send queue capacity (frames).
    pub listener_queue_frames: usize,

    /// Per-subscriber metadata queue capacity (events).
    pub subscriber_queue_len: usize,

    /// Metadata channel heartbeat interval (seconds).
    pub heartbeat_interval_secs: u64,

    /// Busy-wait ceiling for the pace clock (milliseconds).
    pub busy_wait_ceiling_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = radiocast_core::Config::default();
        Self {
            bind_port: 8000,
            media_dir: core.media_dir,
            listener_queue_frames: core.streaming.listener_queue_frames,
            subscriber_queue_len: core.streaming.subscriber_queue_len,
            heartbeat_interval_secs: core.heartbeat_interval_secs,
            busy_wait_ceiling_ms: core.busy_wait_ceiling_ms,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RADIOCAST_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        // Note: RADIOCAST_MEDIA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to radiocast-core's Config type.
    pub fn to_core_config(&self) -> radiocast_core::Config {
        radiocast_core::Config {
            preferred_port: self.bind_port,
            media_dir: self.media_dir.clone(),
            streaming: radiocast_core::StreamingConfig {
                listener_queue_frames: self.listener_queue_frames,
                subscriber_queue_len: self.subscriber_queue_len,
            },
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            busy_wait_ceiling_ms: self.busy_wait_ceiling_ms,
        }
    }
}
