//! Core shared types for Liveplay.
//!
//! This module defines the vocabulary every other crate speaks: identity
//! newtypes for rooms, sessions, participants and plays; the status enums
//! of the room and session state machines; and the [`EventEnvelope`] that
//! carries every state-change notification to connected viewers.
//!
//! Envelopes are notifications, not commands: they describe a change that
//! has already happened in the store. Nothing in the system depends on an
//! envelope being delivered.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a perpetual room.
///
/// Newtype over `u64` so a room id can never be passed where a session or
/// participant id is expected. `#[serde(transparent)]` keeps the JSON
/// representation a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A unique identifier for one game session inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// A unique identifier for a session participant.
///
/// Derives `Ord`: the deterministic winner tie-break ("earlier participant
/// wins") relies on id ordering being stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a recorded round play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayId(pub u64);

impl fmt::Display for PlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Y-{}", self.0)
    }
}

/// A unique identifier for a spectator's presence in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpectatorId(pub u64);

impl fmt::Display for SpectatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A position on the fixed answer grid.
///
/// Answer cards are laid out on a grid; a target id is the card's cell
/// index, which doubles as the participant's bingo position when the
/// answer was correct.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TargetId(pub u8);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// The lifecycle state of a perpetual room.
///
/// ```text
/// Active ──(game completed)──→ Intermission ──(timer elapsed)──→ Active
/// ```
///
/// A room never terminates; it cycles between these two states for as long
/// as the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// A game session is running in this room right now.
    Active,
    /// The room is between games, counting down to the next one.
    Intermission,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Intermission => write!(f, "intermission"),
        }
    }
}

/// The lifecycle state of a game session.
///
/// ```text
/// Pending ──(round 1 starts)──→ Active ──(final round scored)──→ Completed
/// ```
///
/// Pending sessions accept participant joins; Completed sessions are
/// immutable history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// The state of the current round within an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStage {
    /// Submissions are being collected until everyone has played or the
    /// deadline passes.
    Collecting,
    /// The round has been scored; the session is about to advance or
    /// complete.
    Scored,
}

/// Whether a participant is a real person or a simulated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Human,
    Ai,
}

/// A participant's round-1 role declaration.
///
/// Not scored directly; it feeds synergy-bonus eligibility in later
/// rounds. Selectable only while the session is in round 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CSuiteRole {
    Ceo,
    Cfo,
    Cmo,
    Cto,
    Chro,
}

impl CSuiteRole {
    /// All roles, in declaration order.
    pub const ALL: [CSuiteRole; 5] = [
        Self::Ceo,
        Self::Cfo,
        Self::Cmo,
        Self::Cto,
        Self::Chro,
    ];
}

impl fmt::Display for CSuiteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ceo => "ceo",
            Self::Cfo => "cfo",
            Self::Cmo => "cmo",
            Self::Cto => "cto",
            Self::Chro => "chro",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CSuiteRole {
    type Err = crate::ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ceo" => Ok(Self::Ceo),
            "cfo" => Ok(Self::Cfo),
            "cmo" => Ok(Self::Cmo),
            "cto" => Ok(Self::Cto),
            "chro" => Ok(Self::Chro),
            other => Err(crate::ProtocolError::InvalidMessage(format!(
                "unknown c-suite role: {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Leaderboard rows
// ---------------------------------------------------------------------------

/// One participant's line on the leaderboard, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub total_score: u32,
    pub has_golden_card: bool,
    pub c_suite_choice: Option<CSuiteRole>,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Discriminant of a [`GameEvent`], used for typed handler dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GameStarting,
    ParticipantJoined,
    ParticipantInactive,
    CSuiteSelected,
    RoundStarted,
    PlaySubmitted,
    RoundScored,
    ScoreAdjusted,
    GameCompleted,
    IntermissionStarted,
    SpectatorCountChanged,
    SessionUpdated,
    ParticipantUpdated,
    RoomUpdated,
}

/// A state-change notification, one strongly-typed payload per variant.
///
/// Internally tagged so the wire shape is
/// `{ "type": "round_started", "round_number": 3, ... }` — handler dispatch
/// on the receiving side stays exhaustive and compile-checked instead of
/// stringly-typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A new game session has been created and is accepting joins.
    GameStarting {
        session_id: SessionId,
        game_number: u32,
    },

    /// A participant joined the pending session.
    ParticipantJoined {
        participant_id: ParticipantId,
        display_name: String,
        kind: ParticipantKind,
    },

    /// A participant went offline; their plays remain, but they are no
    /// longer eligible to submit.
    ParticipantInactive { participant_id: ParticipantId },

    /// A participant declared their round-1 role.
    CSuiteSelected {
        participant_id: ParticipantId,
        role: CSuiteRole,
    },

    /// A round opened for submissions.
    RoundStarted {
        session_id: SessionId,
        round_number: u32,
        prompt: String,
        targets: Vec<TargetId>,
        /// Epoch-milliseconds deadline after which the round advances
        /// without the missing submissions.
        ends_at: u64,
    },

    /// One participant's answer was recorded.
    PlaySubmitted {
        participant_id: ParticipantId,
        round_number: u32,
        is_correct: bool,
    },

    /// A round was scored; carries the refreshed leaderboard.
    RoundScored {
        round_number: u32,
        leaderboard: Vec<LeaderboardRow>,
    },

    /// A post-hoc score correction. History is never rewritten silently;
    /// corrections surface as their own event.
    ScoreAdjusted {
        participant_id: ParticipantId,
        amount: u32,
        reason: String,
    },

    /// The final round was scored and a winner determined.
    GameCompleted {
        session_id: SessionId,
        winner: Option<ParticipantId>,
        leaderboard: Vec<LeaderboardRow>,
    },

    /// The room entered intermission; the next game is scheduled.
    IntermissionStarted {
        next_game_starts_at: u64,
        total_games_played: u64,
    },

    /// The room's spectator count changed.
    SpectatorCountChanged { count: u32 },

    /// Authoritative session snapshot from the store's change feed.
    SessionUpdated {
        session_id: SessionId,
        status: SessionStatus,
        current_round: u32,
        rounds_completed: u32,
    },

    /// Authoritative participant snapshot from the store's change feed.
    ParticipantUpdated { row: LeaderboardRow },

    /// Authoritative room snapshot from the store's change feed.
    RoomUpdated {
        status: RoomStatus,
        current_game_number: u32,
        current_player_count: u32,
        spectator_count: u32,
    },
}

impl GameEvent {
    /// Returns the discriminant used for handler dispatch.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::GameStarting { .. } => EventKind::GameStarting,
            Self::ParticipantJoined { .. } => EventKind::ParticipantJoined,
            Self::ParticipantInactive { .. } => EventKind::ParticipantInactive,
            Self::CSuiteSelected { .. } => EventKind::CSuiteSelected,
            Self::RoundStarted { .. } => EventKind::RoundStarted,
            Self::PlaySubmitted { .. } => EventKind::PlaySubmitted,
            Self::RoundScored { .. } => EventKind::RoundScored,
            Self::ScoreAdjusted { .. } => EventKind::ScoreAdjusted,
            Self::GameCompleted { .. } => EventKind::GameCompleted,
            Self::IntermissionStarted { .. } => EventKind::IntermissionStarted,
            Self::SpectatorCountChanged { .. } => EventKind::SpectatorCountChanged,
            Self::SessionUpdated { .. } => EventKind::SessionUpdated,
            Self::ParticipantUpdated { .. } => EventKind::ParticipantUpdated,
            Self::RoomUpdated { .. } => EventKind::RoomUpdated,
        }
    }
}

/// The top-level notification wrapper fanned out to every connected viewer.
///
/// Carries no ownership semantics: it describes a change that already
/// happened in the store. Receivers must tolerate duplicates (delivery is
/// at-least-once across the fast path and the change feed) and loss
/// (recovery is the pull-based status query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The room this event belongs to (one fan-out channel per room).
    pub room_id: RoomId,
    /// Epoch-milliseconds when the envelope was built.
    pub timestamp: u64,
    /// The strongly-typed payload.
    pub event: GameEvent,
}

impl EventEnvelope {
    /// Builds an envelope stamped with the current wall-clock time.
    pub fn new(room_id: RoomId, event: GameEvent) -> Self {
        Self {
            room_id,
            timestamp: crate::time::now_ms(),
            event,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
