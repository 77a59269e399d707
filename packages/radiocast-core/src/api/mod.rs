//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to the engine, the
//! broadcaster, and the playlist. It provides the router construction and
//! server startup functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::broadcast::AudioBroadcaster;
use crate::engine::BroadcastEngine;
use crate::playlist::Playlist;
use crate::state::Config;

pub mod http;
pub mod response;
mod stream;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort {
        /// First port tried.
        start: u16,
        /// Last port tried.
        end: u16,
    },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to the core components.
/// All business logic lives in the components themselves.
#[derive(Clone)]
pub struct AppState {
    /// The producer driving the broadcast.
    pub engine: Arc<BroadcastEngine>,
    /// Fan-out hub for audio and now-playing metadata.
    pub broadcaster: Arc<AudioBroadcaster>,
    /// Cyclic track catalog with its own subscriber channel.
    pub playlist: Arc<Playlist>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    /// Bundles the core components into the API state.
    pub fn new(
        engine: Arc<BroadcastEngine>,
        broadcaster: Arc<AudioBroadcaster>,
        playlist: Arc<Playlist>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            engine,
            broadcaster,
            playlist,
            config,
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(8000, 8010).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);

    // into_make_service_with_connect_info enables ConnectInfo<SocketAddr>
    // extraction in the streaming handlers
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
