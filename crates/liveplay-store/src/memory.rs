//! In-memory reference implementation of the [`Store`] trait.
//!
//! Backed by `RwLock`-guarded maps with atomic id allocation. Every
//! conditional operation runs its guard and its write inside one critical
//! section, so the CAS semantics hold under arbitrary concurrent callers —
//! the same guarantees a SQL implementation would get from transactions
//! and unique constraints.
//!
//! # Concurrency note
//!
//! No lock is ever held across an `.await`: each operation takes the lock,
//! does its work synchronously, emits its change records, and releases.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use liveplay_protocol::{
    now_ms, CSuiteRole, ParticipantId, ParticipantKind, PlayId, RoomId, RoomStatus,
    RoundStage, SessionId, SessionStatus, SpectatorId,
};
use rand::Rng;
use tokio::sync::{broadcast, RwLock};

use crate::{
    ActiveRound, Cas, GameSession, NewParticipant, NewPlay, NewSession, PerpetualRoom,
    RoundPlay, RoundResult, SessionParticipant, SlotClaim, Spectator, Store, StoreChange,
    StoreError,
};

/// Capacity of the change-feed broadcast channel. Slow consumers that fall
/// further behind than this observe a lag and must re-read from the store.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Room-code alphabet with the easily confused characters removed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, PerpetualRoom>,
    sessions: HashMap<SessionId, GameSession>,
    participants: HashMap<ParticipantId, SessionParticipant>,
    /// Join index: which participants belong to which session.
    session_members: HashMap<SessionId, Vec<ParticipantId>>,
    /// Keyed by the composite-unique play identity.
    plays: HashMap<(SessionId, u32, ParticipantId), RoundPlay>,
    spectators: HashMap<SpectatorId, Spectator>,
}

/// In-memory [`Store`] with full conditional-update semantics.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<StoreChange>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Publishes a change record. A send error only means there are no
    /// subscribers right now, which is fine.
    fn emit(&self, change: StoreChange) {
        let _ = self.changes.send(change);
    }

    fn generate_room_code(inner: &Inner) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..CODE_LEN)
                .map(|_| {
                    let idx = rng.random_range(0..CODE_ALPHABET.len());
                    CODE_ALPHABET[idx] as char
                })
                .collect();
            if !inner.rooms.values().any(|r| r.room_code == code) {
                return code;
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn room_mut(&mut self, id: RoomId) -> Result<&mut PerpetualRoom, StoreError> {
        self.rooms.get_mut(&id).ok_or(StoreError::RoomNotFound(id))
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut GameSession, StoreError> {
        self.sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn participant_mut(
        &mut self,
        id: ParticipantId,
    ) -> Result<&mut SessionParticipant, StoreError> {
        self.participants
            .get_mut(&id)
            .ok_or(StoreError::ParticipantNotFound(id))
    }

    fn members(&self, session_id: SessionId) -> Vec<SessionParticipant> {
        let mut members: Vec<SessionParticipant> = self
            .session_members
            .get(&session_id)
            .into_iter()
            .flatten()
            .filter_map(|pid| self.participants.get(pid).cloned())
            .collect();
        members.sort_by_key(|p| p.id);
        members
    }
}

impl Store for MemoryStore {
    // -- Rooms ------------------------------------------------------------

    async fn create_room(&self, max_players_per_game: u32) -> Result<PerpetualRoom, StoreError> {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        let room = PerpetualRoom {
            id: RoomId(self.alloc_id()),
            room_code: Self::generate_room_code(&inner),
            status: RoomStatus::Intermission,
            max_players_per_game,
            current_game_number: 0,
            current_session: None,
            current_player_count: 0,
            spectator_count: 0,
            total_games_played: 0,
            avg_game_duration_ms: 0,
            // A fresh room is ready for its first game immediately.
            next_game_starts_at: Some(now),
            created_at: now,
        };
        inner.rooms.insert(room.id, room.clone());
        drop(inner);

        tracing::info!(room_id = %room.id, code = %room.room_code, "room created");
        self.emit(StoreChange::Room(room.clone()));
        Ok(room)
    }

    async fn room(&self, id: RoomId) -> Result<PerpetualRoom, StoreError> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(&id)
            .cloned()
            .ok_or(StoreError::RoomNotFound(id))
    }

    async fn rooms(&self) -> Result<Vec<PerpetualRoom>, StoreError> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<PerpetualRoom> = inner.rooms.values().cloned().collect();
        rooms.sort_by_key(|r| r.id.0);
        Ok(rooms)
    }

    async fn activate_room(
        &self,
        id: RoomId,
        new: NewSession,
    ) -> Result<Cas<(PerpetualRoom, SessionId)>, StoreError> {
        let mut inner = self.inner.write().await;
        let room = inner.room_mut(id)?;

        if room.status != RoomStatus::Intermission {
            let session_id = room.current_session.ok_or_else(|| {
                StoreError::Inconsistent(format!("active room {id} has no linked session"))
            })?;
            return Ok(Cas::Conflict((room.clone(), session_id)));
        }

        let game_number = room.current_game_number + 1;
        let session = GameSession {
            id: SessionId(self.alloc_id()),
            room_id: id,
            game_number,
            status: SessionStatus::Pending,
            current_round: 1,
            total_rounds: new.total_rounds,
            rounds_completed: 0,
            round: None,
            bingo_slots_total: new.bingo_slots_total,
            bingo_slots_remaining: new.bingo_slots_total,
            total_participants: 0,
            human_participants: 0,
            ai_participants: 0,
            started_at: None,
            completed_at: None,
            winner: None,
        };

        room.status = RoomStatus::Active;
        room.current_game_number = game_number;
        room.current_session = Some(session.id);
        room.current_player_count = 0;
        room.next_game_starts_at = None;
        let room = room.clone();
        inner.sessions.insert(session.id, session.clone());
        drop(inner);

        tracing::info!(
            room_id = %id,
            session_id = %session.id,
            game_number,
            "room activated"
        );
        self.emit(StoreChange::Room(room.clone()));
        self.emit(StoreChange::Session(session.clone()));
        Ok(Cas::Applied((room, session.id)))
    }

    async fn rest_room(
        &self,
        id: RoomId,
        next_game_starts_at: u64,
        game_duration_ms: u64,
    ) -> Result<Cas<PerpetualRoom>, StoreError> {
        let mut inner = self.inner.write().await;
        let room = inner.room_mut(id)?;

        if room.status != RoomStatus::Active {
            return Ok(Cas::Conflict(room.clone()));
        }

        // Running average over completed games, widened to avoid overflow.
        let played = room.total_games_played;
        let avg = (u128::from(room.avg_game_duration_ms) * u128::from(played)
            + u128::from(game_duration_ms))
            / u128::from(played + 1);
        room.avg_game_duration_ms = avg as u64;
        room.total_games_played = played + 1;
        room.status = RoomStatus::Intermission;
        room.current_session = None;
        room.current_player_count = 0;
        room.next_game_starts_at = Some(next_game_starts_at);
        let room = room.clone();
        drop(inner);

        tracing::info!(
            room_id = %id,
            games_played = room.total_games_played,
            "room resting until next game"
        );
        self.emit(StoreChange::Room(room.clone()));
        Ok(Cas::Applied(room))
    }

    // -- Sessions ---------------------------------------------------------

    async fn session(&self, id: SessionId) -> Result<GameSession, StoreError> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::SessionNotFound(id))
    }

    async fn begin_round(
        &self,
        id: SessionId,
        round: ActiveRound,
    ) -> Result<Cas<GameSession>, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(id)?;

        let startable = match session.status {
            SessionStatus::Pending => round.round_number == 1,
            SessionStatus::Active => true,
            SessionStatus::Completed => false,
        };
        if !startable
            || round.round_number != session.current_round
            || session.round.is_some()
        {
            return Ok(Cas::Conflict(session.clone()));
        }

        if session.status == SessionStatus::Pending {
            session.status = SessionStatus::Active;
            session.started_at = Some(round.started_at);
        }
        session.round = Some(round);
        let session = session.clone();
        drop(inner);

        self.emit(StoreChange::Session(session.clone()));
        Ok(Cas::Applied(session))
    }

    async fn claim_round_scoring(
        &self,
        id: SessionId,
        round_number: u32,
    ) -> Result<Cas<GameSession>, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(id)?;

        let claimable = session.status == SessionStatus::Active
            && session
                .round
                .as_ref()
                .is_some_and(|r| r.round_number == round_number && r.stage == RoundStage::Collecting);
        if !claimable {
            return Ok(Cas::Conflict(session.clone()));
        }

        if let Some(round) = session.round.as_mut() {
            round.stage = RoundStage::Scored;
        }
        session.rounds_completed += 1;
        let session = session.clone();
        drop(inner);

        self.emit(StoreChange::Session(session.clone()));
        Ok(Cas::Applied(session))
    }

    async fn advance_round(
        &self,
        id: SessionId,
        from_round: u32,
    ) -> Result<Cas<GameSession>, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(id)?;

        let advanceable = session.status == SessionStatus::Active
            && session.current_round == from_round
            && session.current_round < session.total_rounds
            && session
                .round
                .as_ref()
                .is_some_and(|r| r.stage == RoundStage::Scored);
        if !advanceable {
            return Ok(Cas::Conflict(session.clone()));
        }

        session.current_round += 1;
        session.round = None;
        let session = session.clone();
        drop(inner);

        self.emit(StoreChange::Session(session.clone()));
        Ok(Cas::Applied(session))
    }

    async fn complete_session(
        &self,
        id: SessionId,
        winner: Option<ParticipantId>,
    ) -> Result<Cas<GameSession>, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(id)?;

        let completable = session.status == SessionStatus::Active
            && session.current_round == session.total_rounds
            && session
                .round
                .as_ref()
                .is_some_and(|r| r.stage == RoundStage::Scored);
        if !completable {
            return Ok(Cas::Conflict(session.clone()));
        }

        session.status = SessionStatus::Completed;
        session.round = None;
        session.completed_at = Some(now_ms());
        session.winner = winner;
        let session = session.clone();
        drop(inner);

        tracing::info!(session_id = %id, winner = ?winner, "session completed");
        self.emit(StoreChange::Session(session.clone()));
        Ok(Cas::Applied(session))
    }

    // -- Participants -----------------------------------------------------

    async fn add_participant(
        &self,
        new: NewParticipant,
    ) -> Result<SessionParticipant, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(new.session_id)?;

        if session.status != SessionStatus::Pending {
            return Err(StoreError::RoundConflict(format!(
                "session {} is no longer accepting joins",
                new.session_id
            )));
        }
        let room_id = session.room_id;
        let max = inner
            .rooms
            .get(&room_id)
            .map(|r| r.max_players_per_game)
            .ok_or(StoreError::RoomNotFound(room_id))?;
        let session = inner.session_mut(new.session_id)?;
        if session.total_participants >= max {
            return Err(StoreError::SessionFull(new.session_id));
        }

        session.total_participants += 1;
        match new.kind {
            ParticipantKind::Human => session.human_participants += 1,
            ParticipantKind::Ai => session.ai_participants += 1,
        }
        let session = session.clone();

        let participant = SessionParticipant {
            id: ParticipantId(self.alloc_id()),
            session_id: new.session_id,
            kind: new.kind,
            display_name: new.display_name,
            total_score: 0,
            has_golden_card: false,
            c_suite_choice: None,
            is_active: true,
            correct_streak: 0,
            incorrect_count: 0,
            correct_positions: BTreeSet::new(),
            joined_at: now_ms(),
        };
        inner
            .participants
            .insert(participant.id, participant.clone());
        inner
            .session_members
            .entry(new.session_id)
            .or_default()
            .push(participant.id);

        let room = inner.room_mut(room_id)?;
        room.current_player_count += 1;
        let room = room.clone();
        drop(inner);

        tracing::info!(
            participant_id = %participant.id,
            session_id = %participant.session_id,
            kind = ?participant.kind,
            "participant joined"
        );
        self.emit(StoreChange::Session(session));
        self.emit(StoreChange::Room(room));
        self.emit(StoreChange::Participant {
            room_id,
            participant: participant.clone(),
        });
        Ok(participant)
    }

    async fn participant(&self, id: ParticipantId) -> Result<SessionParticipant, StoreError> {
        let inner = self.inner.read().await;
        inner
            .participants
            .get(&id)
            .cloned()
            .ok_or(StoreError::ParticipantNotFound(id))
    }

    async fn participants(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SessionParticipant>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.sessions.contains_key(&session_id) {
            return Err(StoreError::SessionNotFound(session_id));
        }
        Ok(inner.members(session_id))
    }

    async fn set_c_suite(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        role: CSuiteRole,
    ) -> Result<SessionParticipant, StoreError> {
        let mut inner = self.inner.write().await;

        let session = inner.session_mut(session_id)?;
        if session.status != SessionStatus::Active || session.current_round != 1 {
            return Err(StoreError::RoundConflict(format!(
                "c-suite selection is only open during round 1 of an active game \
                 (session {} is {} on round {})",
                session_id, session.status, session.current_round
            )));
        }
        let room_id = session.room_id;

        let participant = inner.participant_mut(participant_id)?;
        if participant.session_id != session_id {
            return Err(StoreError::ParticipantNotFound(participant_id));
        }
        participant.c_suite_choice = Some(role);
        let participant = participant.clone();
        drop(inner);

        self.emit(StoreChange::Participant {
            room_id,
            participant: participant.clone(),
        });
        Ok(participant)
    }

    async fn apply_round_results(
        &self,
        session_id: SessionId,
        results: &[RoundResult],
    ) -> Result<Vec<SessionParticipant>, StoreError> {
        let mut inner = self.inner.write().await;
        let room_id = inner.session_mut(session_id)?.room_id;

        let mut changed = Vec::with_capacity(results.len());
        for result in results {
            let participant = inner.participant_mut(result.participant_id)?;
            participant.total_score += result.score_delta;
            participant.correct_streak = result.new_streak;
            if result.submitted && !result.correct {
                participant.incorrect_count += 1;
            }
            if let Some(position) = result.position {
                participant.correct_positions.insert(position);
            }
            if result.awarded_golden_card {
                participant.has_golden_card = true;
            }
            changed.push(participant.clone());
        }
        let members = inner.members(session_id);
        drop(inner);

        for participant in changed {
            self.emit(StoreChange::Participant {
                room_id,
                participant,
            });
        }
        Ok(members)
    }

    async fn adjust_participant_score(
        &self,
        id: ParticipantId,
        amount: u32,
    ) -> Result<SessionParticipant, StoreError> {
        let mut inner = self.inner.write().await;
        let participant = inner.participant_mut(id)?;
        participant.total_score += amount;
        let participant = participant.clone();
        let room_id = inner
            .sessions
            .get(&participant.session_id)
            .map(|s| s.room_id)
            .ok_or(StoreError::SessionNotFound(participant.session_id))?;
        drop(inner);

        self.emit(StoreChange::Participant {
            room_id,
            participant: participant.clone(),
        });
        Ok(participant)
    }

    async fn set_participant_active(
        &self,
        id: ParticipantId,
        active: bool,
    ) -> Result<SessionParticipant, StoreError> {
        let mut inner = self.inner.write().await;
        let participant = inner.participant_mut(id)?;
        let was_active = participant.is_active;
        participant.is_active = active;
        let participant = participant.clone();

        let room_id = inner
            .sessions
            .get(&participant.session_id)
            .map(|s| s.room_id)
            .ok_or(StoreError::SessionNotFound(participant.session_id))?;
        if was_active != active {
            let room = inner.room_mut(room_id)?;
            if active {
                room.current_player_count += 1;
            } else {
                room.current_player_count = room.current_player_count.saturating_sub(1);
            }
            let room = room.clone();
            drop(inner);
            self.emit(StoreChange::Room(room));
        } else {
            drop(inner);
        }

        self.emit(StoreChange::Participant {
            room_id,
            participant: participant.clone(),
        });
        Ok(participant)
    }

    // -- Plays ------------------------------------------------------------

    async fn record_play(&self, new: NewPlay) -> Result<RoundPlay, StoreError> {
        let mut inner = self.inner.write().await;

        let session = inner.session_mut(new.session_id)?;
        let collecting = session.status == SessionStatus::Active
            && session.round.as_ref().is_some_and(|r| {
                r.round_number == new.round_number && r.stage == RoundStage::Collecting
            });
        if !collecting {
            return Err(StoreError::RoundConflict(format!(
                "round {} of session {} is not collecting submissions",
                new.round_number, new.session_id
            )));
        }
        let room_id = session.room_id;

        let participant = inner.participant_mut(new.participant_id)?;
        if participant.session_id != new.session_id {
            return Err(StoreError::ParticipantNotFound(new.participant_id));
        }

        let key = (new.session_id, new.round_number, new.participant_id);
        if inner.plays.contains_key(&key) {
            return Err(StoreError::DuplicatePlay {
                round: new.round_number,
                participant: new.participant_id,
            });
        }

        let play = RoundPlay {
            id: PlayId(self.alloc_id()),
            session_id: new.session_id,
            round_number: new.round_number,
            participant_id: new.participant_id,
            clicked_target: new.clicked_target,
            is_correct: new.is_correct,
            response_time_ms: new.response_time_ms,
            submitted_at: now_ms(),
        };
        inner.plays.insert(key, play.clone());
        drop(inner);

        self.emit(StoreChange::Play {
            room_id,
            play: play.clone(),
        });
        Ok(play)
    }

    async fn plays_for_round(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> Result<Vec<RoundPlay>, StoreError> {
        let inner = self.inner.read().await;
        let mut plays: Vec<RoundPlay> = inner
            .plays
            .values()
            .filter(|p| p.session_id == session_id && p.round_number == round_number)
            .cloned()
            .collect();
        plays.sort_by_key(|p| p.id.0);
        Ok(plays)
    }

    async fn count_plays(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .plays
            .values()
            .filter(|p| p.session_id == session_id && p.round_number == round_number)
            .count() as u32)
    }

    async fn play_counts(&self, session_id: SessionId) -> Result<Vec<(u32, u32)>, StoreError> {
        let inner = self.inner.read().await;
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for play in inner.plays.values() {
            if play.session_id == session_id {
                *counts.entry(play.round_number).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    // -- Bingo slots ------------------------------------------------------

    async fn claim_bingo_slot(&self, session_id: SessionId) -> Result<SlotClaim, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(session_id)?;

        if session.bingo_slots_remaining == 0 {
            return Ok(SlotClaim::Lost);
        }
        session.bingo_slots_remaining -= 1;
        let session = session.clone();
        drop(inner);

        tracing::debug!(
            session_id = %session_id,
            remaining = session.bingo_slots_remaining,
            "bingo slot claimed"
        );
        self.emit(StoreChange::Session(session));
        Ok(SlotClaim::Won)
    }

    // -- Spectators -------------------------------------------------------

    async fn add_spectator(&self, room_id: RoomId) -> Result<Spectator, StoreError> {
        let mut inner = self.inner.write().await;
        let room = inner.room_mut(room_id)?;
        room.spectator_count += 1;
        let count = room.spectator_count;

        let spectator = Spectator {
            id: SpectatorId(self.alloc_id()),
            room_id,
            joined_at: now_ms(),
        };
        inner.spectators.insert(spectator.id, spectator.clone());
        drop(inner);

        self.emit(StoreChange::SpectatorCount { room_id, count });
        Ok(spectator)
    }

    async fn remove_spectator(&self, id: SpectatorId) -> Result<u32, StoreError> {
        let mut inner = self.inner.write().await;
        let spectator = inner
            .spectators
            .remove(&id)
            .ok_or(StoreError::SpectatorNotFound(id))?;
        let room = inner.room_mut(spectator.room_id)?;
        room.spectator_count = room.spectator_count.saturating_sub(1);
        let count = room.spectator_count;
        drop(inner);

        self.emit(StoreChange::SpectatorCount {
            room_id: spectator.room_id,
            count,
        });
        Ok(count)
    }

    // -- Change feed ------------------------------------------------------

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use liveplay_protocol::TargetId;

    // -- Helpers ----------------------------------------------------------

    fn new_session() -> NewSession {
        NewSession {
            total_rounds: 3,
            bingo_slots_total: 2,
        }
    }

    fn round(n: u32) -> ActiveRound {
        ActiveRound {
            round_number: n,
            prompt: format!("round {n}"),
            correct_target: TargetId(0),
            targets: vec![TargetId(0), TargetId(1), TargetId(2)],
            started_at: now_ms(),
            ends_at: now_ms() + 60_000,
            stage: RoundStage::Collecting,
        }
    }

    async fn active_session(store: &MemoryStore) -> (RoomId, SessionId) {
        let room = store.create_room(8).await.unwrap();
        let cas = store.activate_room(room.id, new_session()).await.unwrap();
        let (_, session_id) = cas.into_record();
        (room.id, session_id)
    }

    async fn join(store: &MemoryStore, session_id: SessionId, name: &str) -> ParticipantId {
        store
            .add_participant(NewParticipant {
                session_id,
                display_name: name.into(),
                kind: ParticipantKind::Human,
            })
            .await
            .unwrap()
            .id
    }

    fn play(session_id: SessionId, round: u32, pid: ParticipantId, correct: bool) -> NewPlay {
        NewPlay {
            session_id,
            round_number: round,
            participant_id: pid,
            clicked_target: if correct { TargetId(0) } else { TargetId(1) },
            is_correct: correct,
            response_time_ms: 1_200,
        }
    }

    // =====================================================================
    // Rooms
    // =====================================================================

    #[tokio::test]
    async fn test_create_room_starts_in_intermission_ready_now() {
        let store = MemoryStore::new();
        let room = store.create_room(8).await.unwrap();

        assert_eq!(room.status, RoomStatus::Intermission);
        assert_eq!(room.current_game_number, 0);
        assert_eq!(room.room_code.len(), CODE_LEN);
        assert!(room.next_game_starts_at.unwrap() <= now_ms());
    }

    #[tokio::test]
    async fn test_create_room_codes_are_unique() {
        let store = MemoryStore::new();
        let a = store.create_room(8).await.unwrap();
        let b = store.create_room(8).await.unwrap();
        assert_ne!(a.room_code, b.room_code);
    }

    #[tokio::test]
    async fn test_activate_room_links_first_game() {
        let store = MemoryStore::new();
        let room = store.create_room(8).await.unwrap();

        let cas = store.activate_room(room.id, new_session()).await.unwrap();
        assert!(cas.applied());
        let (room, session_id) = cas.into_record();

        assert_eq!(room.status, RoomStatus::Active);
        assert_eq!(room.current_game_number, 1);
        assert_eq!(room.current_session, Some(session_id));
        assert!(room.next_game_starts_at.is_none());

        let session = store.session(session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.game_number, 1);
        assert_eq!(session.current_round, 1);
    }

    #[tokio::test]
    async fn test_activate_room_second_caller_converges_on_same_session() {
        let store = MemoryStore::new();
        let room = store.create_room(8).await.unwrap();

        let first = store.activate_room(room.id, new_session()).await.unwrap();
        let second = store.activate_room(room.id, new_session()).await.unwrap();

        assert!(first.applied());
        assert!(!second.applied());
        // The loser observes the winner's session, and the game number
        // moved exactly once.
        assert_eq!(first.record().1, second.record().1);
        assert_eq!(second.record().0.current_game_number, 1);
    }

    #[tokio::test]
    async fn test_rest_room_schedules_next_game_and_averages_duration() {
        let store = MemoryStore::new();
        let (room_id, _) = active_session(&store).await;

        let cas = store.rest_room(room_id, now_ms() + 30_000, 120_000).await.unwrap();
        assert!(cas.applied());
        let room = cas.into_record();

        assert_eq!(room.status, RoomStatus::Intermission);
        assert_eq!(room.total_games_played, 1);
        assert_eq!(room.avg_game_duration_ms, 120_000);
        assert!(room.current_session.is_none());
        assert!(room.next_game_starts_at.is_some());
    }

    #[tokio::test]
    async fn test_rest_room_running_average_folds_in_new_duration() {
        let store = MemoryStore::new();
        let (room_id, _) = active_session(&store).await;
        store.rest_room(room_id, 0, 100_000).await.unwrap();

        store.activate_room(room_id, new_session()).await.unwrap();
        let cas = store.rest_room(room_id, 0, 200_000).await.unwrap();

        assert_eq!(cas.into_record().avg_game_duration_ms, 150_000);
    }

    #[tokio::test]
    async fn test_rest_room_conflicts_when_already_intermission() {
        let store = MemoryStore::new();
        let room = store.create_room(8).await.unwrap();
        let cas = store.rest_room(room.id, 0, 0).await.unwrap();
        assert!(!cas.applied());
    }

    // =====================================================================
    // Rounds
    // =====================================================================

    #[tokio::test]
    async fn test_begin_round_activates_pending_session() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;

        let cas = store.begin_round(session_id, round(1)).await.unwrap();
        assert!(cas.applied());
        let session = cas.into_record();

        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.started_at.is_some());
        assert_eq!(session.round.unwrap().round_number, 1);
    }

    #[tokio::test]
    async fn test_begin_round_twice_is_a_conflict() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;

        assert!(store.begin_round(session_id, round(1)).await.unwrap().applied());
        assert!(!store.begin_round(session_id, round(1)).await.unwrap().applied());
    }

    #[tokio::test]
    async fn test_begin_round_rejects_wrong_round_number() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;

        let cas = store.begin_round(session_id, round(2)).await.unwrap();
        assert!(!cas.applied());
    }

    #[tokio::test]
    async fn test_claim_round_scoring_single_winner() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        store.begin_round(session_id, round(1)).await.unwrap();

        let first = store.claim_round_scoring(session_id, 1).await.unwrap();
        let second = store.claim_round_scoring(session_id, 1).await.unwrap();

        assert!(first.applied());
        assert!(!second.applied());
        assert_eq!(first.record().rounds_completed, 1);
        // The loser still sees the already-claimed state.
        assert_eq!(second.record().rounds_completed, 1);
    }

    #[tokio::test]
    async fn test_advance_round_moves_forward_and_clears_round() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        store.begin_round(session_id, round(1)).await.unwrap();
        store.claim_round_scoring(session_id, 1).await.unwrap();

        let cas = store.advance_round(session_id, 1).await.unwrap();
        assert!(cas.applied());
        let session = cas.into_record();
        assert_eq!(session.current_round, 2);
        assert!(session.round.is_none());

        // Advancing again from the stale round number is a no-op.
        assert!(!store.advance_round(session_id, 1).await.unwrap().applied());
    }

    #[tokio::test]
    async fn test_advance_round_refuses_before_scoring() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        store.begin_round(session_id, round(1)).await.unwrap();

        assert!(!store.advance_round(session_id, 1).await.unwrap().applied());
    }

    #[tokio::test]
    async fn test_complete_session_only_after_final_round_scored() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        let pid = join(&store, session_id, "solo").await;

        // Walk all three rounds.
        for n in 1..=3 {
            store.begin_round(session_id, round(n)).await.unwrap();
            if n == 1 {
                // Completing early must conflict.
                assert!(!store
                    .complete_session(session_id, Some(pid))
                    .await
                    .unwrap()
                    .applied());
            }
            store.claim_round_scoring(session_id, n).await.unwrap();
            if n < 3 {
                store.advance_round(session_id, n).await.unwrap();
            }
        }

        let cas = store.complete_session(session_id, Some(pid)).await.unwrap();
        assert!(cas.applied());
        let session = cas.into_record();
        assert!(session.is_completed());
        assert_eq!(session.winner, Some(pid));
        assert!(session.completed_at.is_some());
    }

    // =====================================================================
    // Participants
    // =====================================================================

    #[tokio::test]
    async fn test_add_participant_counts_kinds_and_room_players() {
        let store = MemoryStore::new();
        let (room_id, session_id) = active_session(&store).await;

        join(&store, session_id, "alice").await;
        store
            .add_participant(NewParticipant {
                session_id,
                display_name: "bot-1".into(),
                kind: ParticipantKind::Ai,
            })
            .await
            .unwrap();

        let session = store.session(session_id).await.unwrap();
        assert_eq!(session.total_participants, 2);
        assert_eq!(session.human_participants, 1);
        assert_eq!(session.ai_participants, 1);
        assert_eq!(store.room(room_id).await.unwrap().current_player_count, 2);
    }

    #[tokio::test]
    async fn test_add_participant_rejected_after_round_one_starts() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        store.begin_round(session_id, round(1)).await.unwrap();

        let result = store
            .add_participant(NewParticipant {
                session_id,
                display_name: "late".into(),
                kind: ParticipantKind::Human,
            })
            .await;
        assert!(matches!(result, Err(StoreError::RoundConflict(_))));
    }

    #[tokio::test]
    async fn test_add_participant_respects_room_capacity() {
        let store = MemoryStore::new();
        let room = store.create_room(1).await.unwrap();
        let cas = store.activate_room(room.id, new_session()).await.unwrap();
        let (_, session_id) = cas.into_record();

        join(&store, session_id, "only").await;
        let result = store
            .add_participant(NewParticipant {
                session_id,
                display_name: "overflow".into(),
                kind: ParticipantKind::Human,
            })
            .await;
        assert!(matches!(result, Err(StoreError::SessionFull(_))));
    }

    #[tokio::test]
    async fn test_set_c_suite_outside_round_one_is_round_conflict() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        let pid = join(&store, session_id, "alice").await;

        // Pending session (round 1 not started yet) — also rejected.
        let result = store.set_c_suite(session_id, pid, CSuiteRole::Ceo).await;
        assert!(matches!(result, Err(StoreError::RoundConflict(_))));

        store.begin_round(session_id, round(1)).await.unwrap();
        store.set_c_suite(session_id, pid, CSuiteRole::Ceo).await.unwrap();

        store.claim_round_scoring(session_id, 1).await.unwrap();
        store.advance_round(session_id, 1).await.unwrap();
        let result = store.set_c_suite(session_id, pid, CSuiteRole::Cfo).await;
        assert!(matches!(result, Err(StoreError::RoundConflict(_))));
    }

    #[tokio::test]
    async fn test_set_participant_active_tracks_room_count() {
        let store = MemoryStore::new();
        let (room_id, session_id) = active_session(&store).await;
        let pid = join(&store, session_id, "alice").await;

        store.set_participant_active(pid, false).await.unwrap();
        assert_eq!(store.room(room_id).await.unwrap().current_player_count, 0);

        // Idempotent: repeating doesn't underflow.
        store.set_participant_active(pid, false).await.unwrap();
        assert_eq!(store.room(room_id).await.unwrap().current_player_count, 0);
    }

    // =====================================================================
    // Plays
    // =====================================================================

    #[tokio::test]
    async fn test_record_play_duplicate_is_rejected_and_state_untouched() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        let pid = join(&store, session_id, "alice").await;
        store.begin_round(session_id, round(1)).await.unwrap();

        store.record_play(play(session_id, 1, pid, true)).await.unwrap();
        let result = store.record_play(play(session_id, 1, pid, false)).await;

        assert!(matches!(result, Err(StoreError::DuplicatePlay { .. })));
        assert_eq!(store.count_plays(session_id, 1).await.unwrap(), 1);
        // The original play is untouched by the rejected retry.
        let plays = store.plays_for_round(session_id, 1).await.unwrap();
        assert!(plays[0].is_correct);
    }

    #[tokio::test]
    async fn test_record_play_against_non_current_round_is_round_conflict() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        let pid = join(&store, session_id, "alice").await;
        store.begin_round(session_id, round(1)).await.unwrap();

        let result = store.record_play(play(session_id, 2, pid, true)).await;
        assert!(matches!(result, Err(StoreError::RoundConflict(_))));
    }

    #[tokio::test]
    async fn test_play_counts_groups_by_round() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await;
        let a = join(&store, session_id, "a").await;
        let b = join(&store, session_id, "b").await;

        store.begin_round(session_id, round(1)).await.unwrap();
        store.record_play(play(session_id, 1, a, true)).await.unwrap();
        store.record_play(play(session_id, 1, b, false)).await.unwrap();
        store.claim_round_scoring(session_id, 1).await.unwrap();
        store.advance_round(session_id, 1).await.unwrap();

        store.begin_round(session_id, round(2)).await.unwrap();
        store.record_play(play(session_id, 2, a, true)).await.unwrap();

        assert_eq!(store.play_counts(session_id).await.unwrap(), vec![(1, 2), (2, 1)]);
    }

    // =====================================================================
    // Bingo slots
    // =====================================================================

    #[tokio::test]
    async fn test_claim_bingo_slot_exactly_n_wins() {
        let store = MemoryStore::new();
        let (_, session_id) = active_session(&store).await; // 2 slots

        let mut wins = 0;
        for _ in 0..5 {
            if store.claim_bingo_slot(session_id).await.unwrap() == SlotClaim::Won {
                wins += 1;
            }
        }
        assert_eq!(wins, 2);
        assert_eq!(
            store.session(session_id).await.unwrap().bingo_slots_remaining,
            0
        );
    }

    #[tokio::test]
    async fn test_claim_bingo_slot_concurrent_claims_never_overspend() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let (_, session_id) = active_session(&store).await; // 2 slots

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.claim_bingo_slot(session_id).await.unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() == SlotClaim::Won {
                wins += 1;
            }
        }
        assert_eq!(wins, 2, "exactly the configured slot count may win");
    }

    // =====================================================================
    // Spectators and change feed
    // =====================================================================

    #[tokio::test]
    async fn test_spectator_join_leave_updates_count() {
        let store = MemoryStore::new();
        let room = store.create_room(8).await.unwrap();

        let s1 = store.add_spectator(room.id).await.unwrap();
        store.add_spectator(room.id).await.unwrap();
        assert_eq!(store.room(room.id).await.unwrap().spectator_count, 2);

        let count = store.remove_spectator(s1.id).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_change_feed_reports_mutations() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_changes();

        let room = store.create_room(8).await.unwrap();
        match feed.recv().await.unwrap() {
            StoreChange::Room(r) => assert_eq!(r.id, room.id),
            other => panic!("expected Room change, got {other:?}"),
        }

        store.activate_room(room.id, new_session()).await.unwrap();
        // Activation publishes the room first, then the new session.
        assert!(matches!(feed.recv().await.unwrap(), StoreChange::Room(_)));
        assert!(matches!(feed.recv().await.unwrap(), StoreChange::Session(_)));
    }
}
