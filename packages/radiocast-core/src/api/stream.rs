//! Streaming connection handlers.
//!
//! Separated from the REST handlers due to their distinct concerns: live
//! stream header sets, per-connection logging, and detach-on-disconnect.
//!
//! Each connection owns the receiving half of a bounded mpsc channel whose
//! sending half lives in a broadcaster or playlist registry. When the client
//! disconnects, axum drops the body stream, the guard inside it detaches the
//! sink, and the producer side stops seeing the connection.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::api::AppState;
use crate::broadcast::AudioBroadcaster;
use crate::error::{RadiocastError, RadiocastResult};
use crate::playlist::Playlist;
use crate::protocol_constants::APP_NAME;

/// Which registry a connection's sink lives in.
enum Sink {
    Listener(Arc<AudioBroadcaster>),
    NowPlaying(Arc<AudioBroadcaster>),
    Playlist(Arc<Playlist>),
}

impl Sink {
    fn label(&self) -> &'static str {
        match self {
            Self::Listener(_) => "audio listener",
            Self::NowPlaying(_) => "now-playing subscriber",
            Self::Playlist(_) => "playlist subscriber",
        }
    }

    fn detach(&self, id: Uuid) {
        match self {
            Self::Listener(broadcaster) => broadcaster.detach_listener(id),
            Self::NowPlaying(broadcaster) => broadcaster.detach_subscriber(id),
            Self::Playlist(playlist) => playlist.detach_subscriber(id),
        }
    }
}

/// Logs one connection's lifecycle and detaches its sink on drop.
///
/// Owned by the response body stream, so dropping the connection (client
/// disconnect or server shutdown) is what triggers the detach.
struct ConnectionGuard {
    sink: Sink,
    id: Uuid,
    client_ip: IpAddr,
    started: Instant,
    chunks_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ConnectionGuard {
    fn new(sink: Sink, id: Uuid, client_ip: IpAddr) -> Self {
        log::info!(
            "[Stream] {} connected: client={}, id={}",
            sink.label(),
            client_ip,
            id
        );
        Self {
            sink,
            id,
            client_ip,
            started: Instant::now(),
            chunks_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    fn record(&self, len: usize) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.sink.detach(self.id);
        log::info!(
            "[Stream] {} disconnected: client={}, id={}, chunks={}, bytes={}, connected_for={:.1}s",
            self.sink.label(),
            self.client_ip,
            self.id,
            self.chunks_sent.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.started.elapsed().as_secs_f32()
        );
    }
}

/// Builds a live streaming response over a connection's receiver.
///
/// Every live channel disables caching and upstream proxy buffering.
fn live_response(
    rx: mpsc::Receiver<Bytes>,
    guard: ConnectionGuard,
    content_type: &'static str,
) -> RadiocastResult<Response> {
    let stream = ReceiverStream::new(rx).map(move |chunk| {
        guard.record(chunk.len());
        Ok::<Bytes, Infallible>(chunk)
    });

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| RadiocastError::Internal(e.to_string()))
}

/// `GET /stream` - the audio channel: a raw concatenation of MPEG frames.
pub(super) async fn stream_audio(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> RadiocastResult<Response> {
    let capacity = state.config.read().streaming.listener_queue_frames;
    let (tx, rx) = mpsc::channel::<Bytes>(capacity);
    let id = state.broadcaster.attach_listener(tx);
    let guard = ConnectionGuard::new(
        Sink::Listener(Arc::clone(&state.broadcaster)),
        id,
        remote_addr.ip(),
    );
    let mut response = live_response(rx, guard, "audio/mpeg")?;
    // Station identification for players that display a stream name
    response
        .headers_mut()
        .insert("icy-name", header::HeaderValue::from_static(APP_NAME));
    Ok(response)
}

/// `GET /events/now-playing` - SSE feed of the retained now-playing snapshot.
pub(super) async fn now_playing_events(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> RadiocastResult<Response> {
    let capacity = state.config.read().streaming.subscriber_queue_len;
    let (tx, rx) = mpsc::channel::<Bytes>(capacity);
    let id = state.broadcaster.attach_subscriber(tx);
    let guard = ConnectionGuard::new(
        Sink::NowPlaying(Arc::clone(&state.broadcaster)),
        id,
        remote_addr.ip(),
    );
    live_response(rx, guard, "text/event-stream")
}

/// `GET /events/playlist` - SSE feed of playlist snapshots and track changes.
pub(super) async fn playlist_events(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> RadiocastResult<Response> {
    let capacity = state.config.read().streaming.subscriber_queue_len;
    let (tx, rx) = mpsc::channel::<Bytes>(capacity);
    let id = state.playlist.attach_subscriber(tx);
    let guard = ConnectionGuard::new(
        Sink::Playlist(Arc::clone(&state.playlist)),
        id,
        remote_addr.ip(),
    );
    live_response(rx, guard, "text/event-stream")
}
