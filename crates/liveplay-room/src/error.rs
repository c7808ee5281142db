//! Error types for the room lifecycle layer.

use std::time::Duration;

use liveplay_protocol::{RoomId, SessionId};
use liveplay_store::StoreError;
use liveplay_engine::EngineError;

/// Errors surfaced by room lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The intermission countdown has not elapsed yet (and the start was
    /// not forced).
    #[error("room {0} is still in intermission for {1:?}")]
    IntermissionNotOver(RoomId, Duration),

    /// `end_game` was called for a session that is not completed.
    #[error("session {0} is not completed")]
    SessionNotCompleted(SessionId),

    /// The cycle driver for this room is no longer running.
    #[error("cycle driver for room {0} has stopped")]
    DriverStopped(RoomId),

    /// A store failure bubbled up unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An engine failure bubbled up unchanged (the driver calls the
    /// engine to start rounds and force evaluations).
    #[error(transparent)]
    Engine(#[from] EngineError),
}
