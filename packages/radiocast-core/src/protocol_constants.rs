//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (MPEG audio framing,
//! ID3v2, SSE) and changing them would break protocol compliance.

// ─────────────────────────────────────────────────────────────────────────────
// MPEG-1 Layer III Framing
// ─────────────────────────────────────────────────────────────────────────────

/// PCM samples represented by one MPEG-1 Layer III frame.
pub const SAMPLES_PER_FRAME: u32 = 1152;

/// Bitrate table for MPEG-1 Layer III, indexed by the 4-bit bitrate field (kbps).
///
/// Index 0 (free bitrate) and index 15 (reserved) are not playable here and
/// are encoded as `None`.
pub const BITRATE_KBPS: [Option<u32>; 16] = [
    None,
    Some(32),
    Some(40),
    Some(48),
    Some(56),
    Some(64),
    Some(80),
    Some(96),
    Some(112),
    Some(128),
    Some(160),
    Some(192),
    Some(224),
    Some(256),
    Some(320),
    None,
];

/// Sample-rate table for MPEG-1, indexed by the 2-bit sample-rate field (Hz).
///
/// Index 3 is reserved.
pub const SAMPLE_RATE_HZ: [Option<u32>; 4] = [Some(44_100), Some(48_000), Some(32_000), None];

/// Size of an ID3v2 tag header (bytes): "ID3", version, flags, synchsafe length.
pub const ID3V2_HEADER_LEN: usize = 10;

/// Size of an MPEG audio frame header (bytes).
pub const FRAME_HEADER_LEN: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// SSE (Server-Sent Events)
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between comment-only keep-alives on metadata channels (seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Engine Scheduling
// ─────────────────────────────────────────────────────────────────────────────

/// Back-off before retrying when the playlist hands out no track (seconds).
pub const EMPTY_PLAYLIST_BACKOFF_SECS: u64 = 5;

/// Back-off after a per-track failure (open error, read error) (seconds).
pub const TRACK_ERROR_BACKOFF_SECS: u64 = 1;

/// Default ceiling for the busy-wait tail of a paced wait (milliseconds).
///
/// OS timers carry positive jitter of a few milliseconds; sleeping up to
/// `delay - ceiling` and spinning the rest keeps aggregate pacing within a
/// fraction of a frame. The spin is bounded so a cooperative runtime is
/// never blocked for longer than this.
pub const DEFAULT_BUSY_WAIT_CEILING_MS: u64 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Configuration Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default per-listener send queue capacity (frames).
///
/// A frame is ~26ms of audio, so 256 frames ≈ 6.7s. A listener whose queue
/// fills past this bound is dropped rather than allowed to stall the stream.
pub const DEFAULT_LISTENER_QUEUE_FRAMES: usize = 256;

/// Default per-subscriber metadata queue capacity (events).
pub const DEFAULT_SUBSCRIBER_QUEUE_LEN: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in protocol data (HTTP headers, health payload).
pub const APP_NAME: &str = "Radiocast";

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "radiocast";
