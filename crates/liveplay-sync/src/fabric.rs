//! The event-fabric abstraction: best-effort named-channel pub/sub.
//!
//! The fabric is how out-of-process viewers hear about state changes. It
//! is explicitly *best-effort*: a publish may fail, a subscriber may lag,
//! and nothing in the system is allowed to depend on delivery succeeding.
//! The authoritative recovery path is always the pull-based status query.
//!
//! [`LocalFabric`] is the in-process reference implementation; a
//! production deployment would implement [`EventFabric`] over its managed
//! realtime transport.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use liveplay_protocol::RoomId;
use tokio::sync::broadcast;

use crate::SyncError;

/// Per-channel buffer for the in-process fabric. Laggards observe a
/// `Lagged` error and must recover via the status query.
const CHANNEL_CAPACITY: usize = 128;

/// Returns the fabric channel name for a room.
///
/// One logical channel per room; every event for the room is published
/// here.
pub fn room_channel(room_id: RoomId) -> String {
    format!("room:{}", room_id.0)
}

/// A named-channel publish/subscribe transport with no delivery guarantee.
///
/// `Send + Sync + 'static` because the fabric is shared across every task
/// that broadcasts. Payloads are opaque bytes — the fabric does not know
/// about envelopes.
pub trait EventFabric: Send + Sync + 'static {
    /// Publishes a payload to a named channel.
    ///
    /// # Errors
    /// Returns [`SyncError::Transport`] when delivery could not even be
    /// attempted. Callers are expected to log and continue: local state
    /// has already advanced by the time this is called.
    fn publish(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Subscribes to a named channel, creating it if needed.
    fn subscribe(
        &self,
        channel: &str,
    ) -> impl Future<Output = broadcast::Receiver<Vec<u8>>> + Send;
}

// ---------------------------------------------------------------------------
// LocalFabric
// ---------------------------------------------------------------------------

/// In-process [`EventFabric`] backed by one broadcast channel per name.
///
/// Useful for single-process deployments, the demo, and tests. Publishing
/// to a channel nobody subscribed to succeeds and drops the payload, which
/// matches the "notification, not command" contract.
pub struct LocalFabric {
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl LocalFabric {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFabric for LocalFabric {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), SyncError> {
        // A send error only means no subscribers — not a fault.
        let _ = self.sender(channel).send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender(channel).subscribe()
    }
}

// ---------------------------------------------------------------------------
// FailingFabric
// ---------------------------------------------------------------------------

/// An [`EventFabric`] whose publishes always fail.
///
/// Exists to prove the resilience contract: with this fabric installed,
/// every local consumer must still observe every event and no caller may
/// ever see an error.
pub struct FailingFabric;

impl EventFabric for FailingFabric {
    async fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<(), SyncError> {
        Err(SyncError::Transport("fabric is down".into()))
    }

    async fn subscribe(&self, _channel: &str) -> broadcast::Receiver<Vec<u8>> {
        // A receiver whose sender is gone: recv() reports Closed.
        broadcast::channel(1).1
    }
}
