//! Error types for the synchronization layer.

use liveplay_protocol::ProtocolError;

/// Errors that can occur in the synchronization layer.
///
/// Transport failures are produced by fabric implementations but absorbed
/// inside [`Synchronizer::broadcast`](crate::Synchronizer::broadcast) —
/// they are logged, never propagated to callers, because local state has
/// already advanced by the time the fabric is attempted.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The fabric could not deliver (or even attempt to deliver) a
    /// publish.
    #[error("fabric transport failed: {0}")]
    Transport(String),

    /// Envelope encoding/decoding failed at the fabric boundary.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
