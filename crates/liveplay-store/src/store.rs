//! The `Store` trait: the injected durability collaborator.
//!
//! Every contended decision in the system is a conditional write against
//! this interface — there is deliberately no global lock above it.
//! Conditional operations return a [`Cas`] outcome instead of an error so
//! that redundant callers can treat a lost race as success-by-observation:
//! somebody made the transition, which is all the caller needed.

use std::future::Future;

use liveplay_protocol::{
    CSuiteRole, ParticipantId, ParticipantKind, RoomId, SessionId, SpectatorId, TargetId,
};
use tokio::sync::broadcast;

use crate::{
    ActiveRound, GameSession, PerpetualRoom, RoundPlay, SessionParticipant, Spectator,
    StoreError,
};

// ---------------------------------------------------------------------------
// Conditional-write outcomes
// ---------------------------------------------------------------------------

/// The outcome of a compare-and-swap style write.
///
/// Both arms carry the current record, so a caller that lost the race can
/// still observe what the winner wrote.
#[derive(Debug, Clone, PartialEq)]
pub enum Cas<T> {
    /// The expected-state guard held and the write was applied.
    Applied(T),
    /// Another writer got there first; nothing was changed.
    Conflict(T),
}

impl<T> Cas<T> {
    /// `true` if this caller's write took effect.
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The current record, whichever arm we're on.
    pub fn record(&self) -> &T {
        match self {
            Self::Applied(t) | Self::Conflict(t) => t,
        }
    }

    /// Consumes the outcome, returning the current record.
    pub fn into_record(self) -> T {
        match self {
            Self::Applied(t) | Self::Conflict(t) => t,
        }
    }
}

/// The outcome of contending for a limited bingo-bonus slot.
///
/// Losing is benign — scoring continues without the bonus — so this is a
/// value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    Won,
    Lost,
}

// ---------------------------------------------------------------------------
// Write inputs
// ---------------------------------------------------------------------------

/// Parameters for the session created when a room goes active.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub total_rounds: u32,
    pub bingo_slots_total: u32,
}

/// Parameters for a participant joining a pending session.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub session_id: SessionId,
    pub display_name: String,
    pub kind: ParticipantKind,
}

/// Parameters for recording one answer submission.
#[derive(Debug, Clone)]
pub struct NewPlay {
    pub session_id: SessionId,
    pub round_number: u32,
    pub participant_id: ParticipantId,
    pub clicked_target: TargetId,
    pub is_correct: bool,
    pub response_time_ms: u64,
}

/// One participant's outcome from a scoring pass, applied in a single
/// store write. `apply_round_results` is the only writer of
/// `total_score` — scores are never mutated from two code paths.
#[derive(Debug, Clone)]
pub struct RoundResult {
    pub participant_id: ParticipantId,
    /// Points earned this round (base + bonuses). Monotonic add.
    pub score_delta: u32,
    /// Whether a play was recorded for this participant this round.
    pub submitted: bool,
    pub correct: bool,
    /// The streak value carried into the next round.
    pub new_streak: u32,
    /// Set when this participant won a bingo slot this round.
    pub awarded_golden_card: bool,
    /// The grid position to add to `correct_positions`, when correct.
    pub position: Option<TargetId>,
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// A record-level change notification, published by the store after every
/// successful mutation.
///
/// This is the authoritative third signal the synchronizer consumes: a
/// state change written directly (a retried request, a redundant manager)
/// still reaches every local subscriber even if nobody called `broadcast`.
#[derive(Debug, Clone)]
pub enum StoreChange {
    Room(PerpetualRoom),
    Session(GameSession),
    Participant {
        room_id: RoomId,
        participant: SessionParticipant,
    },
    Play {
        room_id: RoomId,
        play: RoundPlay,
    },
    SpectatorCount {
        room_id: RoomId,
        count: u32,
    },
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// Durable record storage with conditional updates and a change feed.
///
/// Implementations must make every `Cas`-returning method atomic with
/// respect to concurrent callers, and must enforce the play-uniqueness
/// constraint inside [`record_play`](Store::record_play). The in-memory
/// [`MemoryStore`](crate::MemoryStore) is the reference implementation.
#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync + 'static {
    // -- Rooms ------------------------------------------------------------

    /// Creates a perpetual room in `Intermission`, ready to start its
    /// first game immediately.
    fn create_room(&self, max_players_per_game: u32) -> impl Future<Output = Result<PerpetualRoom, StoreError>> + Send;

    fn room(&self, id: RoomId) -> impl Future<Output = Result<PerpetualRoom, StoreError>> + Send;

    fn rooms(&self) -> impl Future<Output = Result<Vec<PerpetualRoom>, StoreError>> + Send;

    /// Atomically transitions a room `Intermission → Active`: creates the
    /// next numbered session, links it, and clears the countdown.
    ///
    /// Conflict arm: the room was already `Active`; carries the room and
    /// its currently linked session id, so concurrent starters converge on
    /// the same game.
    fn activate_room(
        &self,
        id: RoomId,
        new: NewSession,
    ) -> impl Future<Output = Result<Cas<(PerpetualRoom, SessionId)>, StoreError>> + Send;

    /// Atomically transitions a room `Active → Intermission`: schedules
    /// the next game, folds the finished game's duration into the running
    /// average, and bumps `total_games_played`.
    fn rest_room(
        &self,
        id: RoomId,
        next_game_starts_at: u64,
        game_duration_ms: u64,
    ) -> impl Future<Output = Result<Cas<PerpetualRoom>, StoreError>> + Send;

    // -- Sessions ---------------------------------------------------------

    fn session(&self, id: SessionId) -> impl Future<Output = Result<GameSession, StoreError>> + Send;

    /// Installs the given round as the session's round in flight.
    ///
    /// Guard: the session must be on `round.round_number` with no round
    /// installed. Round 1 additionally flips the session
    /// `Pending → Active` and stamps `started_at`. A conflict means the
    /// round is already running (or the session has moved on) — callers
    /// treat that as an idempotent no-op.
    fn begin_round(
        &self,
        id: SessionId,
        round: ActiveRound,
    ) -> impl Future<Output = Result<Cas<GameSession>, StoreError>> + Send;

    /// Claims the right to score the given round: flips its stage
    /// `Collecting → Scored` and counts the round as completed.
    ///
    /// Exactly one caller wins this claim per round; everyone else gets
    /// the conflict arm and must not score.
    fn claim_round_scoring(
        &self,
        id: SessionId,
        round_number: u32,
    ) -> impl Future<Output = Result<Cas<GameSession>, StoreError>> + Send;

    /// Advances `current_round` from `from_round` to the next round and
    /// clears the round in flight. Guard: the session is `Active`, on
    /// `from_round`, scored, and not on its final round.
    fn advance_round(
        &self,
        id: SessionId,
        from_round: u32,
    ) -> impl Future<Output = Result<Cas<GameSession>, StoreError>> + Send;

    /// Seals a session after its final round: `Active → Completed`, with
    /// winner and completion time. The record is immutable afterwards.
    fn complete_session(
        &self,
        id: SessionId,
        winner: Option<ParticipantId>,
    ) -> impl Future<Output = Result<Cas<GameSession>, StoreError>> + Send;

    // -- Participants -----------------------------------------------------

    /// Adds a participant to a pending session (joins close when round 1
    /// starts) and bumps the session's and room's player counts.
    fn add_participant(
        &self,
        new: NewParticipant,
    ) -> impl Future<Output = Result<SessionParticipant, StoreError>> + Send;

    fn participant(&self, id: ParticipantId) -> impl Future<Output = Result<SessionParticipant, StoreError>> + Send;

    fn participants(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<SessionParticipant>, StoreError>> + Send;

    /// Records a round-1 role declaration.
    ///
    /// The round-1/active guard is enforced here, under the store's own
    /// atomicity, so a session advancing concurrently cannot slip a late
    /// declaration through. Violations return
    /// [`StoreError::RoundConflict`].
    fn set_c_suite(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        role: CSuiteRole,
    ) -> impl Future<Output = Result<SessionParticipant, StoreError>> + Send;

    /// Applies one scoring pass's results: score deltas, streaks, bingo
    /// positions, golden cards, incorrect counts. Returns the updated
    /// participants.
    fn apply_round_results(
        &self,
        session_id: SessionId,
        results: &[RoundResult],
    ) -> impl Future<Output = Result<Vec<SessionParticipant>, StoreError>> + Send;

    /// Adds a non-negative post-hoc correction to a participant's score.
    fn adjust_participant_score(
        &self,
        id: ParticipantId,
        amount: u32,
    ) -> impl Future<Output = Result<SessionParticipant, StoreError>> + Send;

    /// Marks a participant active or inactive. Inactive participants keep
    /// their play history but are no longer counted as awaited.
    fn set_participant_active(
        &self,
        id: ParticipantId,
        active: bool,
    ) -> impl Future<Output = Result<SessionParticipant, StoreError>> + Send;

    // -- Plays ------------------------------------------------------------

    /// Records one answer submission — the atomic unit contended by
    /// concurrent participants.
    ///
    /// Enforces the composite-unique key `(session, round, participant)`
    /// ([`StoreError::DuplicatePlay`] on violation, leaving state
    /// untouched) and rejects writes against a round that is not the
    /// session's current collecting round
    /// ([`StoreError::RoundConflict`]).
    fn record_play(&self, new: NewPlay) -> impl Future<Output = Result<RoundPlay, StoreError>> + Send;

    fn plays_for_round(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> impl Future<Output = Result<Vec<RoundPlay>, StoreError>> + Send;

    fn count_plays(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Per-round submission counts for a session, ordered by round number.
    fn play_counts(&self, session_id: SessionId) -> impl Future<Output = Result<Vec<(u32, u32)>, StoreError>> + Send;

    // -- Bingo slots ------------------------------------------------------

    /// Atomic conditional decrement of the session's remaining bingo-slot
    /// counter. The first `bingo_slots_total` successful claims win; every
    /// later claim loses. This is the one place in the system requiring a
    /// true compare-and-decrement.
    fn claim_bingo_slot(&self, session_id: SessionId) -> impl Future<Output = Result<SlotClaim, StoreError>> + Send;

    // -- Spectators -------------------------------------------------------

    /// Registers a spectator and bumps the room's spectator count.
    fn add_spectator(&self, room_id: RoomId) -> impl Future<Output = Result<Spectator, StoreError>> + Send;

    /// Removes a spectator; returns the room's new spectator count.
    fn remove_spectator(&self, id: SpectatorId) -> impl Future<Output = Result<u32, StoreError>> + Send;

    // -- Change feed ------------------------------------------------------

    /// Subscribes to record-level change notifications. Every successful
    /// mutation publishes a [`StoreChange`] for each record it touched.
    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange>;
}
