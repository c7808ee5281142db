//! Unified error type for the Liveplay facade.

use liveplay_protocol::ProtocolError;
use liveplay_store::StoreError;
use liveplay_sync::SyncError;
use liveplay_engine::EngineError;
use liveplay_room::RoomError;

/// Top-level error wrapping every layer's error type.
///
/// Callers using the `liveplay` facade deal with this single type; the
/// `#[from]` conversions let `?` lift layer errors automatically. Note
/// what is *not* here: fabric publish failures never reach callers — the
/// synchronizer absorbs them by design.
#[derive(Debug, thiserror::Error)]
pub enum LiveplayError {
    /// Engine-level: validation, not-found, state conflicts, duplicate
    /// submissions.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Room lifecycle: intermission timing, incomplete sessions.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Store-level record and constraint failures.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Synchronization-layer failures surfaced outside of broadcast.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Envelope encode/decode failures.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl LiveplayError {
    /// `true` when the error means "the thing you named does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Engine(EngineError::NotFound(_))
                | Self::Store(
                    StoreError::RoomNotFound(_)
                        | StoreError::SessionNotFound(_)
                        | StoreError::ParticipantNotFound(_)
                        | StoreError::SpectatorNotFound(_)
                )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveplay_protocol::SessionId;

    #[test]
    fn test_from_engine_error() {
        let err: LiveplayError = EngineError::Validation("bad".into()).into();
        assert!(matches!(err, LiveplayError::Engine(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_store_error() {
        let err: LiveplayError = StoreError::SessionNotFound(SessionId(1)).into();
        assert!(matches!(err, LiveplayError::Store(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_engine_not_found_is_not_found() {
        let err: LiveplayError = EngineError::NotFound("session G-9".into()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_state_conflict_is_not_not_found() {
        let err: LiveplayError = EngineError::StateConflict("wrong round".into()).into();
        assert!(!err.is_not_found());
    }
}
