//! Error types for the game-session engine.

use liveplay_protocol::ParticipantId;
use liveplay_store::StoreError;

/// Errors surfaced by engine operations.
///
/// These are the caller-facing taxonomy: the server never auto-retries
/// any of them. `DuplicateSubmission` is a benign rejection — the first
/// play stands and the retry changed nothing. Fabric/transport failures
/// never appear here; the synchronizer absorbs them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed request input: an empty display name, a target not on
    /// this round's card, a negative score adjustment.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The named room, session, or participant does not exist (or the
    /// participant belongs to a different session).
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation hit the wrong round or status: a submission against
    /// a non-current round, a c-suite pick outside round 1, a join after
    /// the game started, an inactive participant submitting.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// The composite-unique play constraint rejected a repeat submission.
    /// Scores are unaffected; the caller may safely ignore this.
    #[error("duplicate submission for round {round} by participant {participant}")]
    DuplicateSubmission {
        round: u32,
        participant: ParticipantId,
    },

    /// The store reported an invariant violation — an implementation bug,
    /// not bad input.
    #[error("internal: {0}")]
    Internal(String),
}

/// Maps store failures onto the engine's caller-facing taxonomy, so `?`
/// produces the right category at every call site.
impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(_)
            | StoreError::SessionNotFound(_)
            | StoreError::ParticipantNotFound(_)
            | StoreError::SpectatorNotFound(_) => Self::NotFound(e.to_string()),
            StoreError::DuplicatePlay { round, participant } => Self::DuplicateSubmission {
                round,
                participant,
            },
            StoreError::RoundConflict(msg) => Self::StateConflict(msg),
            StoreError::SessionFull(id) => {
                Self::StateConflict(format!("session {id} is full"))
            }
            StoreError::Inconsistent(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveplay_protocol::SessionId;

    #[test]
    fn test_duplicate_play_maps_to_duplicate_submission() {
        let err: EngineError = StoreError::DuplicatePlay {
            round: 2,
            participant: ParticipantId(7),
        }
        .into();
        assert!(matches!(
            err,
            EngineError::DuplicateSubmission { round: 2, participant: ParticipantId(7) }
        ));
    }

    #[test]
    fn test_round_conflict_maps_to_state_conflict() {
        let err: EngineError = StoreError::RoundConflict("wrong round".into()).into();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[test]
    fn test_missing_records_map_to_not_found() {
        let err: EngineError = StoreError::SessionNotFound(SessionId(3)).into();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(err.to_string().contains("G-3"));
    }
}
