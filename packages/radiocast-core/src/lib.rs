//! Radiocast Core - shared library for Radiocast.
//!
//! This crate provides the core functionality for Radiocast, a live
//! internet-radio broadcaster: one linear MPEG audio program streamed to any
//! number of HTTP listeners, with now-playing metadata pushed over SSE. It
//! is designed to be used by the standalone headless server and by embedders
//! that bring their own surface.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`frame`]: MPEG-1 Layer III frame extraction from files
//! - [`clock`]: cumulative time-budget pacing
//! - [`broadcast`]: fan-out of audio frames and now-playing metadata
//! - [`engine`]: the producer loop driving the whole program
//! - [`playlist`]: cyclic, directory-backed track catalog
//! - [`sse`]: Server-Sent Events wire framing
//! - [`api`]: HTTP control surface (router, streaming and SSE handlers)
//! - [`state`]: core configuration
//! - [`error`]: centralized error types
//!
//! Data flows `frame -> engine -> broadcast -> listeners`; the engine pulls
//! tracks from a [`TrackSource`](engine::TrackSource) (the playlist) and
//! pushes metadata into the broadcaster at track boundaries. The broadcaster
//! is a passive fan-out and never reaches back upstream.

#![warn(clippy::all)]

pub mod api;
pub mod broadcast;
pub mod clock;
pub mod engine;
pub mod error;
pub mod frame;
pub mod playlist;
pub mod protocol_constants;
pub mod sse;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use api::{start_server, AppState, ServerError};
pub use broadcast::{AudioBroadcaster, ListenerId, NowPlaying, SubscriberId};
pub use clock::PaceClock;
pub use engine::{BroadcastEngine, EngineStatus, TrackSource};
pub use error::{ErrorCode, RadiocastError, RadiocastResult};
pub use frame::{Frame, FrameError, FrameHeader, FrameReader};
pub use playlist::{Playlist, PlaylistEvent, Track};
pub use state::{Config, StreamingConfig};
pub use utils::now_millis;
