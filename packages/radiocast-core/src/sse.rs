//! Server-Sent Events wire framing.
//!
//! Both metadata channels (now-playing and playlist) speak the same minimal
//! SSE dialect: `data: <json>\n\n` events and comment-only `: heartbeat\n\n`
//! keep-alives. Encoding lives here so the channel owners stay transport
//! agnostic.

use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Comment-only keep-alive frame.
pub const HEARTBEAT_FRAME: &[u8] = b": heartbeat\n\n";

/// Returns the keep-alive frame as cheap shared bytes.
#[must_use]
pub fn heartbeat() -> Bytes {
    Bytes::from_static(HEARTBEAT_FRAME)
}

/// Encodes a payload as one SSE data event.
pub fn data_event<T: Serialize>(payload: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    let mut framed = String::with_capacity(json.len() + 8);
    framed.push_str("data: ");
    framed.push_str(&json);
    framed.push_str("\n\n");
    Ok(Bytes::from(framed))
}

/// Spawns a keep-alive task for one subscriber sink.
///
/// Emits a heartbeat every `every` until the receiving side is gone. A full
/// queue skips the beat rather than blocking; the subscriber is congested
/// and will either drain or be dropped by its own channel.
pub fn spawn_heartbeat(tx: mpsc::Sender<Bytes>, every: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match tx.try_send(heartbeat()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
    });
}
