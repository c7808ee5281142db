//! Error types for the store layer.

use liveplay_protocol::{ParticipantId, RoomId, SessionId, SpectatorId};

/// Errors that can occur during store operations.
///
/// Lost conditional writes are NOT errors — they come back as
/// [`Cas::Conflict`](crate::Cas::Conflict) values. These variants cover
/// genuinely missing records and violated constraints.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No room exists with this id.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// No session exists with this id.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// No participant exists with this id (or it belongs to a different
    /// session than the one named in the request).
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),

    /// No spectator exists with this id.
    #[error("spectator {0} not found")]
    SpectatorNotFound(SpectatorId),

    /// The composite-unique constraint on `(session, round, participant)`
    /// rejected a second submission. Benign: the first play stands.
    #[error("duplicate play for round {round} by participant {participant}")]
    DuplicatePlay {
        round: u32,
        participant: ParticipantId,
    },

    /// The operation was attempted against the wrong round or session
    /// status — a submission for a non-current round, a join after round 1
    /// started, a c-suite pick outside round 1.
    #[error("round conflict: {0}")]
    RoundConflict(String),

    /// The session has no player slots left.
    #[error("session {0} is full")]
    SessionFull(SessionId),

    /// A record violated an invariant the store maintains. Indicates a
    /// store implementation bug, not bad caller input.
    #[error("store invariant violated: {0}")]
    Inconsistent(String),
}
