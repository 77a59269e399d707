//! Cyclic, directory-backed track catalog.
//!
//! The playlist scans a media directory for `.mp3` files once at startup and
//! on demand. It keeps two cursors: `next_cursor` (production position - the
//! track handed out on the next request) and `playing_cursor` (UI position -
//! re-located by track id on each change notification, which keeps the UI
//! correct across in-flight reorders).
//!
//! The playlist owns its own metadata subscriber channel, distinct from the
//! broadcaster's now-playing channel, so the two subscription lifecycles
//! never entangle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::engine::TrackSource;
use crate::error::{RadiocastError, RadiocastResult};
use crate::sse;

/// Display artist assigned to scanned files (no tag parsing by design).
const DEFAULT_ARTIST: &str = "Unknown Artist";

/// Display album assigned to scanned files.
const DEFAULT_ALBUM: &str = "Lofi Collection";

/// One entry of the catalog. Immutable once loaded; the set is replaced
/// wholesale by reload/reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable positional id (1-based scan order) for one process lifetime.
    pub id: u64,
    /// Source file on disk.
    pub path: PathBuf,
    /// Display title: file name minus extension.
    pub title: String,
    /// Display artist.
    pub artist: String,
    /// Display album.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Cover art URL, when one is known.
    #[serde(rename = "albumArtUrl", skip_serializing_if = "Option::is_none")]
    pub album_art_url: Option<String>,
    /// Playback length in milliseconds, when known.
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Events pushed on the playlist's own metadata channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaylistEvent {
    /// Full snapshot: sent on attach and after any reorder or reload.
    Playlist {
        /// Current catalog order.
        tracks: Vec<Track>,
        /// Index of the currently playing track.
        #[serde(rename = "currentIndex")]
        current_index: usize,
    },
    /// Sent on each track change.
    TrackChange {
        /// The track that just started.
        track: Track,
        /// Index of that track in the current order.
        #[serde(rename = "currentIndex")]
        current_index: usize,
    },
}

struct PlaylistState {
    tracks: Vec<Track>,
    /// Index of the track handed out on the next `get_next_track`.
    next_cursor: usize,
    /// Index reported to the UI as currently playing.
    playing_cursor: usize,
}

/// Directory-scanning cyclic track list with its own subscriber channel.
pub struct Playlist {
    media_dir: PathBuf,
    state: RwLock<PlaylistState>,
    subscribers: DashMap<Uuid, mpsc::Sender<Bytes>>,
    heartbeat_interval: Duration,
}

impl Playlist {
    /// Scans `media_dir` and builds the catalog.
    ///
    /// A missing directory is created and yields an empty list.
    pub fn load(
        media_dir: impl Into<PathBuf>,
        heartbeat_interval: Duration,
    ) -> RadiocastResult<Self> {
        let media_dir = media_dir.into();
        let tracks = scan_tracks(&media_dir)?;
        log::info!(
            "[Playlist] Loaded {} track(s) from {}",
            tracks.len(),
            media_dir.display()
        );
        Ok(Self {
            media_dir,
            state: RwLock::new(PlaylistState {
                tracks,
                next_cursor: 0,
                playing_cursor: 0,
            }),
            subscribers: DashMap::new(),
            heartbeat_interval,
        })
    }

    /// Hands out the track under the next-cursor and advances it modulo the
    /// catalog length. Returns `None` when the catalog is empty.
    pub fn get_next_track(&self) -> Option<Track> {
        let mut state = self.state.write();
        if state.tracks.is_empty() {
            return None;
        }
        let track = state.tracks[state.next_cursor].clone();
        state.next_cursor = (state.next_cursor + 1) % state.tracks.len();
        Some(track)
    }

    /// Records that `track` went on air: re-locates the playing cursor by id
    /// (no-op if the id vanished in a reload) and pushes a track-change
    /// event to playlist subscribers.
    pub fn notify_track_change(&self, track: &Track) {
        let current_index = {
            let mut state = self.state.write();
            if let Some(idx) = state.tracks.iter().position(|t| t.id == track.id) {
                state.playing_cursor = idx;
            }
            state.playing_cursor
        };
        tracing::debug!(track_id = track.id, current_index, "track_change");
        self.push_event(&PlaylistEvent::TrackChange {
            track: track.clone(),
            current_index,
        });
    }

    /// Adds a playlist subscriber; pushes the current snapshot as its first
    /// message and starts its keep-alive heartbeat.
    pub fn attach_subscriber(&self, tx: mpsc::Sender<Bytes>) -> Uuid {
        let id = Uuid::new_v4();
        {
            // Snapshot + insert under the state lock so a concurrent reorder
            // cannot interleave its snapshot ahead of this one
            let state = self.state.read();
            let snapshot = PlaylistEvent::Playlist {
                tracks: state.tracks.clone(),
                current_index: state.playing_cursor,
            };
            match sse::data_event(&snapshot) {
                Ok(event) => {
                    let _ = tx.try_send(event);
                }
                Err(e) => log::error!("[Playlist] Failed to encode snapshot: {}", e),
            }
            self.subscribers.insert(id, tx.clone());
        }
        sse::spawn_heartbeat(tx, self.heartbeat_interval);
        log::debug!(
            "[Playlist] Subscriber attached: id={}, total={}",
            id,
            self.subscribers.len()
        );
        id
    }

    /// Removes a playlist subscriber; idempotent.
    pub fn detach_subscriber(&self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!(
                "[Playlist] Subscriber detached: id={}, total={}",
                id,
                self.subscribers.len()
            );
        }
    }

    /// Atomically replaces the track order.
    ///
    /// `ids` must be a permutation of the current ids; anything else is
    /// rejected without touching the catalog. Both cursors are recomputed by
    /// locating their previous tracks' ids in the new order, then a fresh
    /// snapshot goes out to subscribers.
    pub fn reorder(&self, ids: &[u64]) -> RadiocastResult<()> {
        let snapshot = {
            let mut state = self.state.write();

            if ids.len() != state.tracks.len() {
                return Err(RadiocastError::InvalidReorder(format!(
                    "expected {} ids, got {}",
                    state.tracks.len(),
                    ids.len()
                )));
            }

            let index_of: HashMap<u64, usize> = state
                .tracks
                .iter()
                .enumerate()
                .map(|(i, t)| (t.id, i))
                .collect();

            let mut used = vec![false; state.tracks.len()];
            let mut reordered = Vec::with_capacity(ids.len());
            for &id in ids {
                match index_of.get(&id) {
                    Some(&i) if !used[i] => {
                        used[i] = true;
                        reordered.push(state.tracks[i].clone());
                    }
                    _ => {
                        return Err(RadiocastError::InvalidReorder(format!(
                            "id {id} is duplicated or not in the playlist"
                        )));
                    }
                }
            }

            let playing_id = state.tracks.get(state.playing_cursor).map(|t| t.id);
            let next_id = state.tracks.get(state.next_cursor).map(|t| t.id);

            state.tracks = reordered;
            let new_playing = playing_id
                .and_then(|id| state.tracks.iter().position(|t| t.id == id))
                .unwrap_or(0);
            let new_next = next_id
                .and_then(|id| state.tracks.iter().position(|t| t.id == id))
                .unwrap_or(0);
            state.playing_cursor = new_playing;
            state.next_cursor = new_next;

            log::info!("[Playlist] Reordered {} track(s)", state.tracks.len());
            PlaylistEvent::Playlist {
                tracks: state.tracks.clone(),
                current_index: state.playing_cursor,
            }
        };
        self.push_event(&snapshot);
        Ok(())
    }

    /// Rescans the media directory, resets both cursors to 0, and pushes a
    /// fresh snapshot.
    pub fn reload(&self) -> RadiocastResult<()> {
        let tracks = scan_tracks(&self.media_dir)?;
        let snapshot = {
            let mut state = self.state.write();
            state.tracks = tracks;
            state.next_cursor = 0;
            state.playing_cursor = 0;
            log::info!(
                "[Playlist] Reloaded {} track(s) from {}",
                state.tracks.len(),
                self.media_dir.display()
            );
            PlaylistEvent::Playlist {
                tracks: state.tracks.clone(),
                current_index: 0,
            }
        };
        self.push_event(&snapshot);
        Ok(())
    }

    /// Point-in-time snapshot for REST reads: (tracks, playing index).
    #[must_use]
    pub fn snapshot(&self) -> (Vec<Track>, usize) {
        let state = self.state.read();
        (state.tracks.clone(), state.playing_cursor)
    }

    /// Number of tracks currently in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tracks.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().tracks.is_empty()
    }

    fn push_event(&self, event: &PlaylistEvent) {
        let framed = match sse::data_event(event) {
            Ok(framed) => framed,
            Err(e) => {
                log::error!("[Playlist] Failed to encode event: {}", e);
                return;
            }
        };
        let mut stale: Vec<Uuid> = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(framed.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "[Playlist] Subscriber {} overflowed its queue, dropping",
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
}

impl TrackSource for Playlist {
    fn next_track(&self) -> Option<Track> {
        self.get_next_track()
    }

    fn notify_track_change(&self, track: &Track) {
        Playlist::notify_track_change(self, track);
    }
}

/// Scans a directory for `.mp3` files (case-insensitive), sorted by file
/// name for a stable scan order, and assigns 1-based positional ids.
fn scan_tracks(dir: &Path) -> RadiocastResult<Vec<Track>> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .map_err(|e| RadiocastError::PlaylistLoad(format!("{}: {e}", dir.display())))?;
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| RadiocastError::PlaylistLoad(format!("{}: {e}", dir.display())))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RadiocastError::PlaylistLoad(e.to_string()))?;
        let path = entry.path();
        let is_mp3 = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));
        if path.is_file() && is_mp3 {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Track {
                id: i as u64 + 1,
                path,
                title,
                artist: DEFAULT_ARTIST.to_string(),
                album: Some(DEFAULT_ALBUM.to_string()),
                album_art_url: None,
                duration_ms: None,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_HEARTBEAT: Duration = Duration::from_secs(30);

    fn dir_with(names: &[&str]) -> TempDir {
        let dir = TempDir::new().expect("create temp dir");
        for name in names {
            std::fs::write(dir.path().join(name), b"stub").expect("write stub file");
        }
        dir
    }

    #[test]
    fn scan_assigns_positional_ids_and_display_fields() {
        let dir = dir_with(&["b.mp3", "a.mp3", "notes.txt", "c.MP3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();
        let (tracks, _) = playlist.snapshot();

        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].title, "a");
        assert_eq!(tracks[1].title, "b");
        assert_eq!(tracks[2].title, "c");
        assert_eq!(tracks.iter().map(|t| t.id).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(tracks[0].artist, "Unknown Artist");
        assert_eq!(tracks[0].album.as_deref(), Some("Lofi Collection"));
    }

    #[test]
    fn missing_directory_is_created_and_empty() {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("not-yet-here");
        let playlist = Playlist::load(&media, TEST_HEARTBEAT).unwrap();
        assert!(playlist.is_empty());
        assert!(media.is_dir());
        assert!(playlist.get_next_track().is_none());
    }

    #[test]
    fn next_cursor_wraps_around() {
        let dir = dir_with(&["a.mp3", "b.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();

        assert_eq!(playlist.get_next_track().unwrap().title, "a");
        assert_eq!(playlist.get_next_track().unwrap().title, "b");
        assert_eq!(playlist.get_next_track().unwrap().title, "a");
    }

    #[test]
    fn notify_track_change_relocates_playing_cursor_by_id() {
        let dir = dir_with(&["a.mp3", "b.mp3", "c.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();
        let (tracks, _) = playlist.snapshot();

        playlist.notify_track_change(&tracks[2]);
        assert_eq!(playlist.snapshot().1, 2);

        // An id that no longer exists leaves the cursor alone
        let mut ghost = tracks[0].clone();
        ghost.id = 99;
        playlist.notify_track_change(&ghost);
        assert_eq!(playlist.snapshot().1, 2);
    }

    #[test]
    fn reorder_preserves_cursor_identity() {
        let dir = dir_with(&["a.mp3", "b.mp3", "c.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();
        let (tracks, _) = playlist.snapshot();

        // Playing b (id 2); next up is a (id 1, cursor still at 0)
        playlist.notify_track_change(&tracks[1]);

        playlist.reorder(&[3, 2, 1]).unwrap();
        let (reordered, playing) = playlist.snapshot();
        assert_eq!(
            reordered.iter().map(|t| t.id).collect::<Vec<_>>(),
            [3, 2, 1]
        );
        // Same track ids under both cursors as before the reorder
        assert_eq!(reordered[playing].id, 2);
        assert_eq!(playlist.get_next_track().unwrap().id, 1);
    }

    #[test]
    fn reorder_with_current_order_is_a_cursor_noop() {
        let dir = dir_with(&["a.mp3", "b.mp3", "c.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();
        playlist.get_next_track();

        playlist.reorder(&[1, 2, 3]).unwrap();
        let (tracks, playing) = playlist.snapshot();
        assert_eq!(tracks.iter().map(|t| t.id).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(playing, 0);
        assert_eq!(playlist.get_next_track().unwrap().id, 2);
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        let dir = dir_with(&["a.mp3", "b.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();

        assert!(playlist.reorder(&[1]).is_err());
        assert!(playlist.reorder(&[1, 1]).is_err());
        assert!(playlist.reorder(&[1, 3]).is_err());

        // Rejected reorders leave the catalog untouched
        let (tracks, _) = playlist.snapshot();
        assert_eq!(tracks.iter().map(|t| t.id).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn reload_resets_cursors_and_is_idempotent() {
        let dir = dir_with(&["a.mp3", "b.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();
        playlist.get_next_track();
        playlist.reload().unwrap();

        let first = playlist.snapshot();
        assert_eq!(first.1, 0);
        playlist.reload().unwrap();
        assert_eq!(playlist.snapshot(), first);
    }

    #[tokio::test]
    async fn subscriber_gets_snapshot_then_track_changes() {
        let dir = dir_with(&["a.mp3", "b.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();

        let (tx, mut rx) = mpsc::channel::<Bytes>(8);
        playlist.attach_subscriber(tx);

        let snapshot = rx.recv().await.unwrap();
        let snapshot = std::str::from_utf8(&snapshot).unwrap();
        assert!(snapshot.contains("\"type\":\"playlist\""));
        assert!(snapshot.contains("\"currentIndex\":0"));

        let track = playlist.get_next_track().unwrap();
        playlist.notify_track_change(&track);
        let change = rx.recv().await.unwrap();
        let change = std::str::from_utf8(&change).unwrap();
        assert!(change.contains("\"type\":\"trackChange\""));
        assert!(change.contains("\"title\":\"a\""));
    }

    #[tokio::test]
    async fn reorder_pushes_fresh_snapshot() {
        let dir = dir_with(&["a.mp3", "b.mp3"]);
        let playlist = Playlist::load(dir.path(), TEST_HEARTBEAT).unwrap();

        let (tx, mut rx) = mpsc::channel::<Bytes>(8);
        playlist.attach_subscriber(tx);
        let _initial = rx.recv().await.unwrap();

        playlist.reorder(&[2, 1]).unwrap();
        let snapshot = rx.recv().await.unwrap();
        let snapshot = std::str::from_utf8(&snapshot).unwrap();
        assert!(snapshot.contains("\"type\":\"playlist\""));
        let b_pos = snapshot.find("\"title\":\"b\"").unwrap();
        let a_pos = snapshot.find("\"title\":\"a\"").unwrap();
        assert!(b_pos < a_pos, "b should come first after reorder");
    }
}
