//! Core application state types.
//!
//! Provides configuration ([`Config`], [`StreamingConfig`]) for the broadcast
//! engine and its HTTP surface.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_BUSY_WAIT_CEILING_MS, DEFAULT_LISTENER_QUEUE_FRAMES, DEFAULT_SUBSCRIBER_QUEUE_LEN,
    HEARTBEAT_INTERVAL_SECS,
};

/// Configuration for audio streaming behavior.
///
/// Groups related streaming parameters that control per-connection queueing
/// and metadata push capacity.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamingConfig {
    /// Per-listener send queue capacity (frames).
    ///
    /// A listener whose queue fills past this bound is dropped rather than
    /// allowed to stall the broadcast. At ~26ms per frame, 256 frames is
    /// roughly 6.7 seconds of slack.
    pub listener_queue_frames: usize,

    /// Per-subscriber metadata queue capacity (events).
    pub subscriber_queue_len: usize,
}

impl StreamingConfig {
    /// Creates a new `StreamingConfig` with validated values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value would cause runtime issues.
    pub fn new(listener_queue_frames: usize, subscriber_queue_len: usize) -> Result<Self, String> {
        let config = Self {
            listener_queue_frames,
            subscriber_queue_len,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.listener_queue_frames == 0 {
            return Err("listener_queue_frames must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.subscriber_queue_len == 0 {
            return Err("subscriber_queue_len must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        Ok(())
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            listener_queue_frames: DEFAULT_LISTENER_QUEUE_FRAMES,
            subscriber_queue_len: DEFAULT_SUBSCRIBER_QUEUE_LEN,
        }
    }
}

/// Configuration for the Radiocast application.
///
/// All fields other than `media_dir` have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    // Catalog
    /// Directory scanned for `.mp3` files at startup and on reload.
    pub media_dir: PathBuf,

    // Streaming
    /// Streaming configuration.
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Metadata channel heartbeat interval (seconds).
    pub heartbeat_interval_secs: u64,

    /// Ceiling for the paced-wait busy-spin tail (milliseconds).
    ///
    /// See [`PaceClock`](crate::clock::PaceClock) for why the tail exists.
    pub busy_wait_ceiling_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            media_dir: PathBuf::from("media"),
            streaming: StreamingConfig::default(),
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            busy_wait_ceiling_ms: DEFAULT_BUSY_WAIT_CEILING_MS,
        }
    }
}
