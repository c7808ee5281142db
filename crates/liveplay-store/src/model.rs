//! Durable-record types: the entities the store persists.
//!
//! These are the server's source of truth. Event envelopes are derived
//! from them, never the other way around.

use std::collections::BTreeSet;

use liveplay_protocol::{
    CSuiteRole, LeaderboardRow, ParticipantId, ParticipantKind, PlayId, RoomId,
    RoomStatus, RoundStage, SessionId, SessionStatus, SpectatorId, TargetId,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PerpetualRoom
// ---------------------------------------------------------------------------

/// A long-lived game room, cycling between an active game and an
/// intermission for as long as the process runs.
///
/// Invariant: exactly one non-terminal session (`current_session`) while
/// `status == Active`; none while `Intermission`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpetualRoom {
    pub id: RoomId,
    /// Human-shareable join code, unique across rooms.
    pub room_code: String,
    pub status: RoomStatus,
    pub max_players_per_game: u32,
    /// Monotonic game counter; the next session is numbered
    /// `current_game_number + 1`.
    pub current_game_number: u32,
    pub current_session: Option<SessionId>,
    pub current_player_count: u32,
    pub spectator_count: u32,
    pub total_games_played: u64,
    /// Running average over completed games, for wait estimates.
    pub avg_game_duration_ms: u64,
    /// Epoch-ms; set only while `Intermission`.
    pub next_game_starts_at: Option<u64>,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// The transient record of the round currently in flight.
///
/// Installed by `begin_round`, flipped to `Scored` by the (single winning)
/// scoring claim, cleared when the session advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRound {
    pub round_number: u32,
    pub prompt: String,
    /// The answer that scores; never sent to clients mid-round.
    pub correct_target: TargetId,
    /// Every selectable target this round (correct one included).
    pub targets: Vec<TargetId>,
    pub started_at: u64,
    /// Epoch-ms deadline — the liveness guarantee against a participant
    /// who never submits.
    pub ends_at: u64,
    pub stage: RoundStage,
}

/// One numbered game inside a perpetual room.
///
/// Mutated only through the store's conditional operations; immutable
/// once `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub room_id: RoomId,
    pub game_number: u32,
    pub status: SessionStatus,
    /// 1-based; only ever increases, and never past `total_rounds`.
    pub current_round: u32,
    pub total_rounds: u32,
    pub rounds_completed: u32,
    /// The round in flight, if any.
    pub round: Option<ActiveRound>,
    pub bingo_slots_total: u32,
    pub bingo_slots_remaining: u32,
    pub total_participants: u32,
    pub human_participants: u32,
    pub ai_participants: u32,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub winner: Option<ParticipantId>,
}

impl GameSession {
    /// `true` once the final round has been scored and the session sealed.
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// SessionParticipant
// ---------------------------------------------------------------------------

/// One player (human or simulated) inside one game session.
///
/// Carries the per-round scoring state (`correct_streak`,
/// `correct_positions`) so a scoring pass is O(participants) instead of
/// re-aggregating the full play history every round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParticipant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    pub kind: ParticipantKind,
    pub display_name: String,
    /// Monotonic non-decreasing within a session.
    pub total_score: u32,
    /// Set when a bingo slot was won; at most `bingo_slots_total` of these
    /// per game.
    pub has_golden_card: bool,
    /// Round-1-only role declaration.
    pub c_suite_choice: Option<CSuiteRole>,
    /// Cleared on disconnect; inactive participants keep their history but
    /// may no longer submit.
    pub is_active: bool,
    /// Consecutive correct rounds ending at the last scored round.
    pub correct_streak: u32,
    /// Submitted-but-wrong answers; the first winner tie-break.
    pub incorrect_count: u32,
    /// Grid positions answered correctly so far — the bingo input.
    pub correct_positions: BTreeSet<TargetId>,
    pub joined_at: u64,
}

impl SessionParticipant {
    /// Projects this participant onto the client-facing leaderboard shape.
    pub fn leaderboard_row(&self) -> LeaderboardRow {
        LeaderboardRow {
            participant_id: self.id,
            display_name: self.display_name.clone(),
            total_score: self.total_score,
            has_golden_card: self.has_golden_card,
            c_suite_choice: self.c_suite_choice,
            is_active: self.is_active,
        }
    }
}

/// Sorts participants into leaderboard order: score descending, then id
/// ascending so equal scores render stably.
pub fn leaderboard(participants: &[SessionParticipant]) -> Vec<LeaderboardRow> {
    let mut rows: Vec<&SessionParticipant> = participants.iter().collect();
    rows.sort_by(|a, b| b.total_score.cmp(&a.total_score).then(a.id.cmp(&b.id)));
    rows.into_iter().map(SessionParticipant::leaderboard_row).collect()
}

// ---------------------------------------------------------------------------
// RoundPlay
// ---------------------------------------------------------------------------

/// One participant's single submitted answer for one round.
///
/// Composite-unique on `(session_id, round_number, participant_id)` — the
/// idempotence guarantee against duplicate and retried submissions.
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPlay {
    pub id: PlayId,
    pub session_id: SessionId,
    pub round_number: u32,
    pub participant_id: ParticipantId,
    pub clicked_target: TargetId,
    pub is_correct: bool,
    pub response_time_ms: u64,
    pub submitted_at: u64,
}

// ---------------------------------------------------------------------------
// Spectator
// ---------------------------------------------------------------------------

/// A passive viewer's presence in a room. Never affects scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectator {
    pub id: SpectatorId,
    pub room_id: RoomId,
    pub joined_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: u64, score: u32) -> SessionParticipant {
        SessionParticipant {
            id: ParticipantId(id),
            session_id: SessionId(1),
            kind: ParticipantKind::Human,
            display_name: format!("player-{id}"),
            total_score: score,
            has_golden_card: false,
            c_suite_choice: None,
            is_active: true,
            correct_streak: 0,
            incorrect_count: 0,
            correct_positions: BTreeSet::new(),
            joined_at: 0,
        }
    }

    #[test]
    fn test_leaderboard_sorts_by_score_descending() {
        let rows = leaderboard(&[
            participant(1, 100),
            participant(2, 300),
            participant(3, 200),
        ]);
        let scores: Vec<u32> = rows.iter().map(|r| r.total_score).collect();
        assert_eq!(scores, vec![300, 200, 100]);
    }

    #[test]
    fn test_leaderboard_breaks_score_ties_by_id() {
        let rows = leaderboard(&[participant(9, 100), participant(2, 100)]);
        assert_eq!(rows[0].participant_id, ParticipantId(2));
        assert_eq!(rows[1].participant_id, ParticipantId(9));
    }

    #[test]
    fn test_leaderboard_row_carries_role_and_flags() {
        let mut p = participant(1, 50);
        p.has_golden_card = true;
        p.c_suite_choice = Some(CSuiteRole::Cto);
        p.is_active = false;

        let row = p.leaderboard_row();
        assert!(row.has_golden_card);
        assert_eq!(row.c_suite_choice, Some(CSuiteRole::Cto));
        assert!(!row.is_active);
    }
}
