//! The client-facing status query: the pull-based recovery path.
//!
//! A client that never receives a push notification must still converge
//! to correct state by polling these projections — that is the system's
//! designed degradation path, not a fallback hack. Everything here is
//! read-only and computed fresh from the store on every call.

use std::collections::HashMap;
use std::sync::Arc;

use liveplay_protocol::{
    LeaderboardRow, ParticipantId, RoomId, RoomStatus, RoundStage, SessionId, SessionStatus,
};
use liveplay_store::{leaderboard, GameSession, Store};
use liveplay_engine::EngineError;
use liveplay_room::estimate_wait;
use serde::Serialize;

use crate::LiveplayError;

// ---------------------------------------------------------------------------
// Projection shapes
// ---------------------------------------------------------------------------

/// Session header fields, as sent to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub room_id: RoomId,
    pub game_number: u32,
    pub status: SessionStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    pub rounds_completed: u32,
    pub total_participants: u32,
    pub human_participants: u32,
    pub ai_participants: u32,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub winner: Option<ParticipantId>,
}

impl From<&GameSession> for SessionSummary {
    fn from(s: &GameSession) -> Self {
        Self {
            id: s.id,
            room_id: s.room_id,
            game_number: s.game_number,
            status: s.status,
            current_round: s.current_round,
            total_rounds: s.total_rounds,
            rounds_completed: s.rounds_completed,
            total_participants: s.total_participants,
            human_participants: s.human_participants,
            ai_participants: s.ai_participants,
            started_at: s.started_at,
            completed_at: s.completed_at,
            winner: s.winner,
        }
    }
}

/// How far along one round's submission collection is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundCompleteness {
    pub round_number: u32,
    pub plays_submitted: u32,
    pub total_participants: u32,
    pub is_complete: bool,
}

/// The full authoritative status of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusReport {
    pub summary: SessionSummary,
    /// Sorted by score descending (id ascending between equals).
    pub leaderboard: Vec<LeaderboardRow>,
    /// One entry per round from 1 through the current round.
    pub rounds: Vec<RoundCompleteness>,
    /// Active participants who have not yet submitted for the current
    /// round; empty unless the round is collecting.
    pub awaiting: Vec<ParticipantId>,
}

/// One room's line in the room browser.
#[derive(Debug, Clone, Serialize)]
pub struct RoomListing {
    pub room_id: RoomId,
    pub room_code: String,
    pub status: RoomStatus,
    pub current_game_number: u32,
    pub current_player_count: u32,
    pub spectator_count: u32,
    pub total_games_played: u64,
    /// Estimated wait before a joiner sees a new game start.
    pub estimated_wait_ms: u64,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Read-only session status projection.
pub struct StatusQuery<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StatusQuery<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Builds the authoritative status report for a session.
    ///
    /// # Errors
    /// Not-found for an unknown session id.
    pub async fn session_status(
        &self,
        session_id: SessionId,
    ) -> Result<SessionStatusReport, LiveplayError> {
        let session = self
            .store
            .session(session_id)
            .await
            .map_err(EngineError::from)?;
        let participants = self
            .store
            .participants(session_id)
            .await
            .map_err(EngineError::from)?;
        let counts: HashMap<u32, u32> = self
            .store
            .play_counts(session_id)
            .await
            .map_err(EngineError::from)?
            .into_iter()
            .collect();

        let rounds = (1..=session.current_round)
            .map(|round_number| {
                let plays_submitted = counts.get(&round_number).copied().unwrap_or(0);
                RoundCompleteness {
                    round_number,
                    plays_submitted,
                    total_participants: session.total_participants,
                    // Complete once scored, or once everyone is in.
                    is_complete: round_number <= session.rounds_completed
                        || plays_submitted >= session.total_participants,
                }
            })
            .collect();

        let awaiting = match &session.round {
            Some(round)
                if session.status == SessionStatus::Active
                    && round.stage == RoundStage::Collecting =>
            {
                let played: Vec<ParticipantId> = self
                    .store
                    .plays_for_round(session_id, round.round_number)
                    .await
                    .map_err(EngineError::from)?
                    .iter()
                    .map(|p| p.participant_id)
                    .collect();
                participants
                    .iter()
                    .filter(|p| p.is_active && !played.contains(&p.id))
                    .map(|p| p.id)
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(SessionStatusReport {
            summary: SessionSummary::from(&session),
            leaderboard: leaderboard(&participants),
            rounds,
            awaiting,
        })
    }
}

/// Read-only room browser projection.
pub struct RoomDirectory<S: Store> {
    store: Arc<S>,
}

impl<S: Store> RoomDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Lists every room with counts and an estimated wait.
    pub async fn list_rooms(&self) -> Result<Vec<RoomListing>, LiveplayError> {
        let rooms = self.store.rooms().await.map_err(EngineError::from)?;
        Ok(rooms
            .iter()
            .map(|room| RoomListing {
                room_id: room.id,
                room_code: room.room_code.clone(),
                status: room.status,
                current_game_number: room.current_game_number,
                current_player_count: room.current_player_count,
                spectator_count: room.spectator_count,
                total_games_played: room.total_games_played,
                estimated_wait_ms: estimate_wait(room).as_millis() as u64,
            })
            .collect())
    }
}
