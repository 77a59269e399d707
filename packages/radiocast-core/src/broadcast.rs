//! Fan-out of audio frames and now-playing metadata to connected clients.
//!
//! [`AudioBroadcaster`] owns two registries: audio listeners (raw byte
//! sinks) and metadata subscribers (SSE text sinks). Sinks are bounded
//! `mpsc` senders owned by the connection tasks; the broadcaster holds the
//! sending half only and deletes its entry when a sink errors, so a dead or
//! slow client never stalls the producer or the other clients.

use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::playlist::Track;
use crate::sse;
use crate::utils::now_millis;

/// The retained snapshot of what is currently on air.
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    /// The track being broadcast.
    pub track: Track,
    /// Wall-clock moment (Unix millis) the first frame of the track went out.
    #[serde(rename = "startedAt")]
    pub started_at: u64,
}

impl NowPlaying {
    /// Creates a snapshot stamped with the current wall-clock time.
    #[must_use]
    pub fn starting_now(track: Track) -> Self {
        Self {
            track,
            started_at: now_millis(),
        }
    }
}

/// Identity of an attached audio listener.
pub type ListenerId = Uuid;

/// Identity of an attached metadata subscriber.
pub type SubscriberId = Uuid;

/// Thread-safe fan-out hub for one broadcast program.
///
/// Attach/detach may be called from any task concurrently with
/// `broadcast_audio`/`publish_now_playing`; registries are `DashMap`s and
/// the retained snapshot sits behind a `parking_lot::RwLock`. No lock is
/// held across a suspension point - all sink writes are `try_send`.
pub struct AudioBroadcaster {
    listeners: DashMap<ListenerId, mpsc::Sender<Bytes>>,
    subscribers: DashMap<SubscriberId, mpsc::Sender<Bytes>>,
    /// Retained now-playing snapshot, replayed to newly attached subscribers.
    ///
    /// The lock also serializes subscriber attachment against publication so
    /// a subscriber's first message is always the freshest snapshot.
    now_playing: RwLock<Option<NowPlaying>>,
    heartbeat_interval: Duration,
}

impl AudioBroadcaster {
    /// Creates an empty broadcaster.
    #[must_use]
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            listeners: DashMap::new(),
            subscribers: DashMap::new(),
            now_playing: RwLock::new(None),
            heartbeat_interval,
        }
    }

    /// Adds an audio listener. No replay of past audio - listeners join
    /// mid-stream at the next frame boundary.
    pub fn attach_listener(&self, tx: mpsc::Sender<Bytes>) -> ListenerId {
        let id = Uuid::new_v4();
        self.listeners.insert(id, tx);
        log::debug!(
            "[Broadcast] Listener attached: id={}, total={}",
            id,
            self.listeners.len()
        );
        id
    }

    /// Adds a metadata subscriber.
    ///
    /// The current now-playing snapshot (if any) is pushed immediately as
    /// the subscriber's first message, and a keep-alive heartbeat runs for
    /// as long as the subscriber stays open.
    pub fn attach_subscriber(&self, tx: mpsc::Sender<Bytes>) -> SubscriberId {
        let id = Uuid::new_v4();
        {
            // Hold the snapshot lock across send + insert: a concurrent
            // publish cannot slip its event in front of the snapshot.
            let now_playing = self.now_playing.read();
            if let Some(ref np) = *now_playing {
                match sse::data_event(np) {
                    Ok(event) => {
                        let _ = tx.try_send(event);
                    }
                    Err(e) => log::error!("[Broadcast] Failed to encode now-playing: {}", e),
                }
            }
            self.subscribers.insert(id, tx.clone());
        }
        sse::spawn_heartbeat(tx, self.heartbeat_interval);
        log::debug!(
            "[Broadcast] Subscriber attached: id={}, total={}",
            id,
            self.subscribers.len()
        );
        id
    }

    /// Removes an audio listener; idempotent.
    pub fn detach_listener(&self, id: ListenerId) {
        if self.listeners.remove(&id).is_some() {
            log::debug!(
                "[Broadcast] Listener detached: id={}, total={}",
                id,
                self.listeners.len()
            );
        }
    }

    /// Removes a metadata subscriber; idempotent.
    pub fn detach_subscriber(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!(
                "[Broadcast] Subscriber detached: id={}, total={}",
                id,
                self.subscribers.len()
            );
        }
    }

    /// Writes one frame to every listener.
    ///
    /// Never blocks and never errors: a listener whose queue is full has
    /// fallen too far behind and is dropped, and a listener whose connection
    /// is gone is removed. Everyone else gets the frame in order.
    pub fn broadcast_audio(&self, frame: Bytes) {
        let mut stale: Vec<ListenerId> = Vec::new();
        for entry in self.listeners.iter() {
            match entry.value().try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "[Broadcast] Listener {} overflowed its queue, dropping",
                        entry.key()
                    );
                    stale.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => {
                    stale.push(*entry.key());
                }
            }
        }
        // Removal happens after the pass so an in-flight iteration is never
        // invalidated by its own detaches
        for id in stale {
            self.detach_listener(id);
        }
    }

    /// Replaces the retained snapshot and pushes it to every subscriber,
    /// with the same per-sink isolation as audio.
    pub fn publish_now_playing(&self, np: NowPlaying) {
        let event = match sse::data_event(&np) {
            Ok(event) => event,
            Err(e) => {
                log::error!("[Broadcast] Failed to encode now-playing: {}", e);
                return;
            }
        };
        tracing::debug!(track_id = np.track.id, "now_playing_published");

        let mut now_playing = self.now_playing.write();
        *now_playing = Some(np);

        let mut stale: Vec<SubscriberId> = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "[Broadcast] Subscriber {} overflowed its queue, dropping",
                        entry.key()
                    );
                    stale.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => {
                    stale.push(*entry.key());
                }
            }
        }
        for id in stale {
            self.detach_subscriber(id);
        }
    }

    /// The retained now-playing snapshot, if a track has started.
    #[must_use]
    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.read().clone()
    }

    /// Number of attached audio listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of attached metadata subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
