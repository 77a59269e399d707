//! The broadcast engine: one producer task driving the whole program.
//!
//! The engine pulls tracks from a [`TrackSource`], reads their frames, and
//! paces them out through the [`AudioBroadcaster`](crate::broadcast::AudioBroadcaster)
//! in real time. Everything downstream (listeners, subscribers) is passive
//! fan-out; everything upstream (playlist mutation) happens concurrently and
//! is observed at track boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::broadcast::{AudioBroadcaster, NowPlaying};
use crate::clock::PaceClock;
use crate::frame::FrameReader;
use crate::playlist::Track;
use crate::protocol_constants::{EMPTY_PLAYLIST_BACKOFF_SECS, TRACK_ERROR_BACKOFF_SECS};

/// Supplies tracks to the engine on demand.
///
/// Implemented by [`Playlist`](crate::playlist::Playlist); tests substitute
/// scripted sources. `next_track` may return `None` (nothing to play right
/// now); the engine backs off and asks again.
pub trait TrackSource: Send + Sync {
    /// The next track to broadcast, advancing the source's own position.
    fn next_track(&self) -> Option<Track>;

    /// Notification that `track` just went on air.
    fn notify_track_change(&self, track: &Track);
}

/// Point-in-time engine snapshot for status reads.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Whether the producer task is running.
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    /// Attached audio listeners.
    #[serde(rename = "listenerCount")]
    pub listener_count: usize,
    /// Attached now-playing subscribers.
    #[serde(rename = "subscriberCount")]
    pub subscriber_count: usize,
    /// Retained now-playing snapshot.
    #[serde(rename = "nowPlaying")]
    pub now_playing: Option<NowPlaying>,
}

/// What ended the per-track streaming loop.
enum TrackEnd {
    /// Clean end of file: start the next track immediately.
    Finished,
    /// `stop()` observed between frames.
    Stopped,
    /// `skip()` observed between frames.
    Skipped,
    /// Reader failure: back off briefly before the next track.
    Failed,
}

/// Long-running producer that owns the current reader and pace clock.
///
/// `start`/`stop` bound one producer task; `skip` terminates the current
/// track early at the next frame boundary.
pub struct BroadcastEngine {
    broadcaster: Arc<AudioBroadcaster>,
    running: AtomicBool,
    skip_requested: AtomicBool,
    /// Wakes back-off sleeps early so `stop()` takes effect promptly.
    wake: Notify,
    busy_wait_ceiling: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastEngine {
    /// Creates an engine that fans out through `broadcaster`.
    #[must_use]
    pub fn new(broadcaster: Arc<AudioBroadcaster>, busy_wait_ceiling: Duration) -> Self {
        Self {
            broadcaster,
            running: AtomicBool::new(false),
            skip_requested: AtomicBool::new(false),
            wake: Notify::new(),
            busy_wait_ceiling,
            handle: Mutex::new(None),
        }
    }

    /// Spawns the producer task.
    ///
    /// Returns `false` (and does nothing) when the engine is already running.
    pub fn start(self: &Arc<Self>, source: Arc<dyn TrackSource>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("[Engine] start() called while already running");
            return false;
        }
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.run(source).await });
        *self.handle.lock() = Some(task);
        true
    }

    /// Requests a stop. The producer observes the flag between frames and
    /// exits promptly; attached connections are left to their transports.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            log::info!("[Engine] Stop requested");
        }
        self.wake.notify_waiters();
    }

    /// Stops the producer and waits for its task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.handle.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Requests that the current track end early at the next frame boundary.
    pub fn skip(&self) {
        self.skip_requested.store(true, Ordering::SeqCst);
        log::info!("[Engine] Skip requested");
    }

    /// Whether the producer task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Point-in-time status snapshot.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            is_running: self.is_running(),
            listener_count: self.broadcaster.listener_count(),
            subscriber_count: self.broadcaster.subscriber_count(),
            now_playing: self.broadcaster.now_playing(),
        }
    }

    /// The producer loop: pull a track, publish its metadata, pace its
    /// frames out, repeat. Per-track failures are logged and skipped; the
    /// loop only exits on `stop()`.
    async fn run(&self, source: Arc<dyn TrackSource>) {
        log::info!("[Engine] Producer started");
        while self.is_running() {
            let Some(track) = source.next_track() else {
                log::debug!(
                    "[Engine] No track available, retrying in {}s",
                    EMPTY_PLAYLIST_BACKOFF_SECS
                );
                self.backoff(Duration::from_secs(EMPTY_PLAYLIST_BACKOFF_SECS))
                    .await;
                continue;
            };

            if !track.path.is_file() {
                log::warn!(
                    "[Engine] Track file missing, skipping: {}",
                    track.path.display()
                );
                self.backoff(Duration::from_secs(TRACK_ERROR_BACKOFF_SECS))
                    .await;
                continue;
            }

            source.notify_track_change(&track);
            self.broadcaster
                .publish_now_playing(NowPlaying::starting_now(track.clone()));
            log::info!(
                "[Engine] Now playing: {} - {} ({})",
                track.artist,
                track.title,
                track.path.display()
            );

            let mut reader = match FrameReader::open(&track.path) {
                Ok(reader) => reader,
                Err(e) => {
                    log::error!("[Engine] Failed to open {}: {}", track.path.display(), e);
                    self.backoff(Duration::from_secs(TRACK_ERROR_BACKOFF_SECS))
                        .await;
                    continue;
                }
            };

            match self.stream_track(&mut reader).await {
                TrackEnd::Finished => {
                    // No inter-track silence: the next track starts at once
                    log::debug!("[Engine] Track finished: {}", track.title);
                }
                TrackEnd::Skipped => {
                    log::info!("[Engine] Track skipped: {}", track.title);
                }
                TrackEnd::Failed => {
                    self.backoff(Duration::from_secs(TRACK_ERROR_BACKOFF_SECS))
                        .await;
                }
                TrackEnd::Stopped => {}
            }
        }
        log::info!("[Engine] Producer stopped");
    }

    /// Streams one open track: broadcast a frame, extend the budget, wait.
    /// Stop and skip flags are observed between frames only.
    async fn stream_track(&self, reader: &mut FrameReader) -> TrackEnd {
        self.skip_requested.store(false, Ordering::SeqCst);
        let mut clock = PaceClock::with_ceiling(self.busy_wait_ceiling);
        loop {
            if !self.is_running() {
                return TrackEnd::Stopped;
            }
            if self.skip_requested.swap(false, Ordering::SeqCst) {
                return TrackEnd::Skipped;
            }
            match reader.next_frame() {
                Ok(Some(frame)) => {
                    self.broadcaster.broadcast_audio(frame.payload);
                    clock.add_time(frame.duration_ms);
                    clock.wait().await;
                }
                Ok(None) => return TrackEnd::Finished,
                Err(e) => {
                    log::error!("[Engine] Read error mid-track: {}", e);
                    return TrackEnd::Failed;
                }
            }
        }
    }

    /// Sleeps for `duration` unless `stop()` wakes us first.
    async fn backoff(&self, duration: Duration) {
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.wake.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameHeader;
    use bytes::Bytes;
    use parking_lot::Mutex as SyncMutex;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// Scripted source: hands out its tracks once, in order, then `None`.
    struct ScriptedSource {
        tracks: SyncMutex<Vec<Track>>,
        changes: SyncMutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn new(tracks: Vec<Track>) -> Arc<Self> {
            Arc::new(Self {
                tracks: SyncMutex::new(tracks),
                changes: SyncMutex::new(Vec::new()),
            })
        }

        fn changes(&self) -> Vec<u64> {
            self.changes.lock().clone()
        }
    }

    impl TrackSource for ScriptedSource {
        fn next_track(&self) -> Option<Track> {
            let mut tracks = self.tracks.lock();
            if tracks.is_empty() {
                None
            } else {
                Some(tracks.remove(0))
            }
        }

        fn notify_track_change(&self, track: &Track) {
            self.changes.lock().push(track.id);
        }
    }

    fn track(id: u64, path: PathBuf) -> Track {
        Track {
            id,
            path,
            title: format!("Track {id}"),
            artist: "Unknown Artist".to_string(),
            album: Some("Lofi Collection".to_string()),
            album_art_url: None,
            duration_ms: None,
        }
    }

    /// Writes a file of `count` 128kbps/44.1kHz frames (26.122ms each)
    /// whose bodies carry `fill`.
    fn write_track(dir: &TempDir, name: &str, count: usize, fill: u8) -> PathBuf {
        write_track_with(dir, name, count, |_| fill)
    }

    /// Like `write_track` but the body byte varies per frame index, so
    /// received frames are distinguishable.
    fn write_track_with(
        dir: &TempDir,
        name: &str,
        count: usize,
        fill: impl Fn(usize) -> u8,
    ) -> PathBuf {
        let header = [0xFF, 0xFB, 0x90, 0x00];
        let size = FrameHeader::parse(header)
            .expect("valid test header")
            .frame_size;
        let mut contents = Vec::with_capacity(size * count);
        for i in 0..count {
            let mut frame = vec![fill(i); size];
            frame[..4].copy_from_slice(&header);
            contents.extend_from_slice(&frame);
        }
        let path = dir.path().join(name);
        std::fs::write(&path, &contents).expect("write track");
        path
    }

    fn test_engine() -> (Arc<BroadcastEngine>, Arc<AudioBroadcaster>) {
        let broadcaster = Arc::new(AudioBroadcaster::new(Duration::from_secs(30)));
        let engine = Arc::new(BroadcastEngine::new(
            Arc::clone(&broadcaster),
            Duration::from_millis(1),
        ));
        (engine, broadcaster)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn plays_tracks_back_to_back_in_frame_order() {
        let dir = TempDir::new().unwrap();
        let path_a = write_track(&dir, "a.mp3", 10, 0xAA);
        let path_b = write_track(&dir, "b.mp3", 5, 0xBB);
        let source = ScriptedSource::new(vec![track(1, path_a), track(2, path_b)]);
        let (engine, broadcaster) = test_engine();

        let (listener_tx, mut listener_rx) = mpsc::channel::<Bytes>(64);
        broadcaster.attach_listener(listener_tx);
        let (sub_tx, mut sub_rx) = mpsc::channel::<Bytes>(8);
        broadcaster.attach_subscriber(sub_tx);

        let started = Instant::now();
        assert!(engine.start(source.clone()));

        let mut frames = Vec::new();
        for _ in 0..15 {
            let frame = timeout(Duration::from_secs(2), listener_rx.recv())
                .await
                .expect("frame within deadline")
                .expect("listener stays attached");
            frames.push(frame);
        }
        let burst = started.elapsed();
        engine.shutdown().await;

        // 10 frames of A then 5 of B, in order
        assert!(frames[..10].iter().all(|f| f[4] == 0xAA));
        assert!(frames[10..].iter().all(|f| f[4] == 0xBB));

        // Paced, not dumped: 15 frames at 26.122ms with the final wait
        // pending means at least 14 inter-frame gaps elapsed
        assert!(burst >= Duration::from_millis(350), "burst was {burst:?}");
        assert!(burst <= Duration::from_millis(600), "burst was {burst:?}");

        // Exactly one publish per track, in playlist order
        assert_eq!(source.changes(), vec![1, 2]);
        let first = sub_rx.recv().await.unwrap();
        assert!(std::str::from_utf8(&first).unwrap().contains("\"id\":1"));
        let second = sub_rx.recv().await.unwrap();
        assert!(std::str::from_utf8(&second).unwrap().contains("\"id\":2"));
        assert!(sub_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn late_listener_sees_the_same_suffix() {
        let dir = TempDir::new().unwrap();
        // Body byte = frame index, so frames are distinguishable
        let path = write_track_with(&dir, "a.mp3", 12, |i| i as u8 + 1);
        let source = ScriptedSource::new(vec![track(1, path)]);
        let (engine, broadcaster) = test_engine();

        let (tx_early, mut rx_early) = mpsc::channel::<Bytes>(64);
        broadcaster.attach_listener(tx_early);
        engine.start(source);

        // Let a few frames pass, then attach the late listener
        let mut early_frames = Vec::new();
        for _ in 0..5 {
            early_frames.push(rx_early.recv().await.unwrap());
        }
        let (tx_late, mut rx_late) = mpsc::channel::<Bytes>(64);
        broadcaster.attach_listener(tx_late);

        // Wait out the rest of the track, then drain both listeners
        let deadline = Duration::from_secs(1);
        while let Ok(Some(frame)) = timeout(deadline, rx_early.recv()).await {
            early_frames.push(frame);
        }
        engine.shutdown().await;
        let mut late_frames = Vec::new();
        while let Ok(frame) = rx_late.try_recv() {
            late_frames.push(frame);
        }

        // The late listener's stream is exactly the tail of the early one
        assert_eq!(early_frames.len(), 12);
        assert!(!late_frames.is_empty());
        assert!(late_frames.len() < early_frames.len());
        assert_eq!(late_frames[..], early_frames[12 - late_frames.len()..]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_halts_between_frames() {
        let dir = TempDir::new().unwrap();
        let path = write_track(&dir, "a.mp3", 200, 0xAA);
        let source = ScriptedSource::new(vec![track(1, path)]);
        let (engine, broadcaster) = test_engine();

        let (tx, mut rx) = mpsc::channel::<Bytes>(256);
        broadcaster.attach_listener(tx);
        engine.start(source);

        rx.recv().await.unwrap();
        engine.shutdown().await;
        assert!(!engine.is_running());

        // Drain whatever was in flight; nothing further arrives
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn skip_advances_to_the_next_track() {
        let dir = TempDir::new().unwrap();
        let path_a = write_track(&dir, "a.mp3", 500, 0xAA);
        let path_b = write_track(&dir, "b.mp3", 2, 0xBB);
        let source = ScriptedSource::new(vec![track(1, path_a), track(2, path_b)]);
        let (engine, broadcaster) = test_engine();

        let (tx, mut rx) = mpsc::channel::<Bytes>(600);
        broadcaster.attach_listener(tx);
        engine.start(source);

        rx.recv().await.unwrap();
        engine.skip();

        // B's frames arrive well before A's 500 frames could have played out
        let deadline = Duration::from_secs(2);
        let mut saw_b = false;
        while let Ok(Some(frame)) = timeout(deadline, rx.recv()).await {
            if frame[4] == 0xBB {
                saw_b = true;
                break;
            }
        }
        assert!(saw_b, "skip should reach track B early");

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_file_is_skipped_with_backoff() {
        let dir = TempDir::new().unwrap();
        let good = write_track(&dir, "good.mp3", 2, 0xCC);
        let source = ScriptedSource::new(vec![
            track(1, dir.path().join("vanished.mp3")),
            track(2, good),
        ]);
        let (engine, broadcaster) = test_engine();

        let (tx, mut rx) = mpsc::channel::<Bytes>(16);
        broadcaster.attach_listener(tx);
        engine.start(source.clone());

        // The missing track costs one 1s back-off, then the good one plays
        let frame = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("good track within deadline")
            .unwrap();
        assert_eq!(frame[4], 0xCC);

        // The engine bails before notifying for missing files
        assert_eq!(source.changes(), vec![2]);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_source_keeps_engine_idle_but_running() {
        let source = ScriptedSource::new(Vec::new());
        let (engine, broadcaster) = test_engine();

        let (tx, mut rx) = mpsc::channel::<Bytes>(8);
        broadcaster.attach_listener(tx);
        engine.start(source);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.is_running());
        assert!(rx.try_recv().is_err());

        // stop() wakes the 5s empty-playlist back-off promptly
        let stop_started = Instant::now();
        engine.shutdown().await;
        assert!(stop_started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_track_playlist_replays_with_one_publish_per_pass() {
        use crate::playlist::Playlist;

        let dir = TempDir::new().unwrap();
        write_track(&dir, "only.mp3", 2, 0xEE);
        let playlist = Arc::new(Playlist::load(dir.path(), Duration::from_secs(30)).unwrap());
        let (engine, broadcaster) = test_engine();

        let (tx, mut rx) = mpsc::channel::<Bytes>(32);
        broadcaster.attach_listener(tx);
        let (sub_tx, mut sub_rx) = mpsc::channel::<Bytes>(8);
        broadcaster.attach_subscriber(sub_tx);

        engine.start(Arc::clone(&playlist) as Arc<dyn TrackSource>);

        // Two full passes of the 2-frame track
        for _ in 0..4 {
            timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("frame within deadline")
                .unwrap();
        }
        engine.shutdown().await;

        // One publish per replay, always the same track
        let mut publishes = 0;
        while let Ok(event) = sub_rx.try_recv() {
            assert!(std::str::from_utf8(&event).unwrap().contains("\"id\":1"));
            publishes += 1;
        }
        assert!(publishes >= 2, "expected one publish per pass, got {publishes}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_start_is_rejected() {
        let source = ScriptedSource::new(Vec::new());
        let (engine, _) = test_engine();
        assert!(engine.start(source.clone()));
        assert!(!engine.start(source));
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_byte_file_advances_immediately() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.mp3");
        std::fs::write(&empty, b"").unwrap();
        let good = write_track(&dir, "good.mp3", 2, 0xDD);
        let source = ScriptedSource::new(vec![track(1, empty), track(2, good)]);
        let (engine, broadcaster) = test_engine();

        let (tx, mut rx) = mpsc::channel::<Bytes>(16);
        broadcaster.attach_listener(tx);

        let started = Instant::now();
        engine.start(source);
        let frame = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("good track within deadline")
            .unwrap();
        assert_eq!(frame[4], 0xDD);
        // No back-off between the empty file and the next track
        assert!(started.elapsed() < Duration::from_millis(500));

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_reflects_engine_state() {
        let dir = TempDir::new().unwrap();
        let path = write_track(&dir, "a.mp3", 100, 0xAA);
        let source = ScriptedSource::new(vec![track(9, path)]);
        let (engine, broadcaster) = test_engine();

        let before = engine.status();
        assert!(!before.is_running);
        assert!(before.now_playing.is_none());

        let (tx, mut rx) = mpsc::channel::<Bytes>(128);
        broadcaster.attach_listener(tx);
        engine.start(source);
        rx.recv().await.unwrap();

        let during = engine.status();
        assert!(during.is_running);
        assert_eq!(during.listener_count, 1);
        assert_eq!(during.now_playing.unwrap().track.id, 9);

        engine.shutdown().await;
        assert!(!engine.status().is_running);
    }
}
