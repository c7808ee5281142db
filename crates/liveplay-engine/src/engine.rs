//! The game-session engine: round state machine, submission
//! reconciliation, and scoring.
//!
//! One engine instance serves every session; it holds no per-session
//! state of its own. Correctness under concurrent submitters comes from
//! the store's conditional writes, not from serializing callers:
//!
//! - `submit_play` contends on the play-uniqueness constraint,
//! - round advance contends on the scoring claim and the round CAS,
//! - the bingo bonus contends on the slot compare-and-decrement.
//!
//! Several callers may decide independently that a round is complete;
//! exactly one wins the scoring claim and everyone else observes a no-op.
//! A round-advance decision is never rolled back — corrections surface as
//! [`GameEvent::ScoreAdjusted`] events, never as silent rewrites.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use liveplay_protocol::{
    now_ms, CSuiteRole, GameEvent, ParticipantId, ParticipantKind, RoundStage, SessionId,
    SessionStatus, TargetId,
};
use liveplay_store::{
    leaderboard, ActiveRound, GameSession, NewParticipant, NewPlay, RoundPlay, RoundResult,
    SessionParticipant, SlotClaim, Store,
};
use liveplay_sync::{EventFabric, Synchronizer};

use crate::{
    BingoGrid, Degrading, EngineError, PromptProvider, PromptRequest, ScoringPolicy,
    StaticPromptSet,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine-wide settings applied to every session it runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long each round collects submissions before the timeout forces
    /// an advance.
    pub round_time_limit: Duration,
    /// Side of the answer grid (bingo board).
    pub grid_side: u8,
    /// What to ask the content provider for.
    pub prompt_request: PromptRequest,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_time_limit: Duration::from_secs(15),
            grid_side: BingoGrid::DEFAULT_SIDE,
            prompt_request: PromptRequest::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives rounds inside game sessions: collects submissions, decides
/// round advance, computes scores and bonuses, detects completion.
pub struct GameSessionEngine<S: Store, F: EventFabric, P: PromptProvider> {
    store: Arc<S>,
    sync: Arc<Synchronizer<F>>,
    prompts: Degrading<P>,
    policy: Arc<dyn ScoringPolicy>,
    grid: BingoGrid,
    config: EngineConfig,
}

impl<S: Store, F: EventFabric, P: PromptProvider> GameSessionEngine<S, F, P> {
    pub fn new(
        store: Arc<S>,
        sync: Arc<Synchronizer<F>>,
        provider: P,
        policy: Arc<dyn ScoringPolicy>,
        config: EngineConfig,
    ) -> Self {
        let grid = BingoGrid::new(config.grid_side);
        let prompts = Degrading::new(provider, StaticPromptSet::career_defaults(&grid), grid);
        Self {
            store,
            sync,
            prompts,
            policy,
            grid,
            config,
        }
    }

    pub fn grid(&self) -> &BingoGrid {
        &self.grid
    }

    // -- Participants -----------------------------------------------------

    /// Adds a participant to a pending session (joins close once round 1
    /// starts), tracks their presence, and announces them.
    pub async fn join_session(
        &self,
        session_id: SessionId,
        display_name: &str,
        kind: ParticipantKind,
    ) -> Result<SessionParticipant, EngineError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("display name is required".into()));
        }

        let session = self.store.session(session_id).await?;
        let participant = self
            .store
            .add_participant(NewParticipant {
                session_id,
                display_name: name.to_string(),
                kind,
            })
            .await?;

        self.sync.track_presence(session.room_id, participant.id).await;
        self.sync
            .broadcast(
                session.room_id,
                GameEvent::ParticipantJoined {
                    participant_id: participant.id,
                    display_name: participant.display_name.clone(),
                    kind: participant.kind,
                },
            )
            .await;
        Ok(participant)
    }

    /// Marks a participant inactive (disconnect). Their play history
    /// stands; they simply stop being eligible to submit.
    pub async fn leave_session(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<(), EngineError> {
        let session = self.store.session(session_id).await?;
        let participant = self.store.participant(participant_id).await?;
        if participant.session_id != session_id {
            return Err(EngineError::NotFound(format!(
                "participant {participant_id} is not in session {session_id}"
            )));
        }

        self.store.set_participant_active(participant_id, false).await?;
        self.sync.untrack_presence(session.room_id, participant_id).await;
        self.sync
            .broadcast(
                session.room_id,
                GameEvent::ParticipantInactive { participant_id },
            )
            .await;
        Ok(())
    }

    /// Records a round-1 role declaration. Rejecting this outside round 1
    /// is a hard invariant: the store enforces it atomically, so a
    /// concurrently advancing session can't let a late pick through.
    pub async fn select_role(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        role: CSuiteRole,
    ) -> Result<SessionParticipant, EngineError> {
        let session = self.store.session(session_id).await?;
        let participant = self
            .store
            .set_c_suite(session_id, participant_id, role)
            .await?;

        self.sync
            .broadcast(
                session.room_id,
                GameEvent::CSuiteSelected {
                    participant_id,
                    role,
                },
            )
            .await;
        Ok(participant)
    }

    // -- Rounds -----------------------------------------------------------

    /// Opens a round for submissions: resolves a prompt (degrading to the
    /// static set on provider failure), computes the deadline, installs
    /// the round, and announces it.
    ///
    /// Idempotent: starting a round that is already running is a no-op
    /// returning current state, so concurrent starters can't double-open.
    pub async fn start_round(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> Result<GameSession, EngineError> {
        let session = self.store.session(session_id).await?;
        if session.is_completed() {
            return Err(EngineError::StateConflict(format!(
                "session {session_id} is completed"
            )));
        }
        if round_number != session.current_round {
            return Err(EngineError::StateConflict(format!(
                "cannot start round {round_number}: session {session_id} is on round {}",
                session.current_round
            )));
        }

        let prompt = self.prompts.resolve(&self.config.prompt_request).await;
        let now = now_ms();
        let round = ActiveRound {
            round_number,
            prompt: prompt.prompt.clone(),
            correct_target: prompt.correct_target,
            targets: prompt.targets(),
            started_at: now,
            ends_at: now + self.config.round_time_limit.as_millis() as u64,
            stage: RoundStage::Collecting,
        };

        let cas = self.store.begin_round(session_id, round.clone()).await?;
        if cas.applied() {
            tracing::info!(
                session_id = %session_id,
                round_number,
                ends_at = round.ends_at,
                "round started"
            );
            self.sync
                .broadcast(
                    session.room_id,
                    GameEvent::RoundStarted {
                        session_id,
                        round_number,
                        prompt: round.prompt,
                        targets: round.targets,
                        ends_at: round.ends_at,
                    },
                )
                .await;
        }
        Ok(cas.into_record())
    }

    /// Records one participant's answer — the atomic unit contended by
    /// concurrent submitters.
    ///
    /// A client retry that lands twice gets [`EngineError::DuplicateSubmission`]
    /// on the second write and changes nothing; that is the idempotence
    /// guarantee, not a fault.
    pub async fn submit_play(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        round_number: u32,
        clicked_target: TargetId,
    ) -> Result<RoundPlay, EngineError> {
        let session = self.store.session(session_id).await?;
        if round_number != session.current_round {
            return Err(EngineError::StateConflict(format!(
                "submission for round {round_number}, but session {session_id} is on round {}",
                session.current_round
            )));
        }
        let round = match &session.round {
            Some(r) if session.status == SessionStatus::Active && r.stage == RoundStage::Collecting => r,
            _ => {
                return Err(EngineError::StateConflict(format!(
                    "round {round_number} of session {session_id} is not collecting submissions"
                )));
            }
        };

        let participant = self.store.participant(participant_id).await?;
        if participant.session_id != session_id {
            return Err(EngineError::NotFound(format!(
                "participant {participant_id} is not in session {session_id}"
            )));
        }
        if !participant.is_active {
            return Err(EngineError::StateConflict(format!(
                "participant {participant_id} is inactive"
            )));
        }
        if !round.targets.contains(&clicked_target) {
            return Err(EngineError::Validation(format!(
                "target {clicked_target} is not on this round's card"
            )));
        }

        let play = self
            .store
            .record_play(NewPlay {
                session_id,
                round_number,
                participant_id,
                clicked_target,
                is_correct: clicked_target == round.correct_target,
                response_time_ms: now_ms().saturating_sub(round.started_at),
            })
            .await?;

        self.sync
            .broadcast(
                session.room_id,
                GameEvent::PlaySubmitted {
                    participant_id,
                    round_number,
                    is_correct: play.is_correct,
                },
            )
            .await;

        // Every submission is a chance to be the one that completes the
        // round; the timeout timer is the other trigger.
        self.evaluate_round_completion(session_id, round_number).await?;
        Ok(play)
    }

    /// Decides whether the round is done: everyone has played, or the
    /// deadline has passed — whichever happens first. The deadline is the
    /// liveness guarantee; without it one absent participant would stall
    /// the game forever.
    ///
    /// Safe to call concurrently and repeatedly: the scoring claim inside
    /// `score_round` picks a single winner, and an already-advanced round
    /// evaluates to a no-op.
    pub async fn evaluate_round_completion(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> Result<bool, EngineError> {
        let session = self.store.session(session_id).await?;
        let Some(round) = &session.round else {
            return Ok(false);
        };
        if session.status != SessionStatus::Active
            || round.round_number != round_number
            || round.stage != RoundStage::Collecting
        {
            return Ok(false);
        }

        let submitted = self.store.count_plays(session_id, round_number).await?;
        let everyone_in = submitted >= session.total_participants;
        let timed_out = now_ms() >= round.ends_at;
        if !(everyone_in || timed_out) {
            return Ok(false);
        }

        tracing::debug!(
            session_id = %session_id,
            round_number,
            submitted,
            total = session.total_participants,
            timed_out,
            "round complete"
        );
        self.score_round(session_id, round_number).await?;
        Ok(true)
    }

    /// Scores a completed round and moves the session along.
    ///
    /// The scoring claim is the serialization point: the one caller whose
    /// claim applies computes every participant's result and writes them
    /// in a single store operation. Losing the claim means someone else
    /// is doing exactly this work — a no-op success.
    pub async fn score_round(
        &self,
        session_id: SessionId,
        round_number: u32,
    ) -> Result<(), EngineError> {
        let claim = self.store.claim_round_scoring(session_id, round_number).await?;
        if !claim.applied() {
            return Ok(());
        }
        let session = claim.into_record();

        let plays = self.store.plays_for_round(session_id, round_number).await?;
        let participants = self.store.participants(session_id).await?;
        let by_participant: HashMap<ParticipantId, &RoundPlay> =
            plays.iter().map(|p| (p.participant_id, p)).collect();

        // Roles of everyone who answered correctly this round — the
        // synergy context is a round-level aggregate.
        let correct_roles: Vec<CSuiteRole> = participants
            .iter()
            .filter(|p| by_participant.get(&p.id).is_some_and(|play| play.is_correct))
            .filter_map(|p| p.c_suite_choice)
            .collect();

        let mut results = Vec::with_capacity(participants.len());
        for participant in &participants {
            results.push(match by_participant.get(&participant.id) {
                Some(&play) => {
                    self.score_participant(&session, participant, play, &correct_roles)
                        .await?
                }
                // No play this round: streak resets, nothing else moves.
                None => RoundResult {
                    participant_id: participant.id,
                    score_delta: 0,
                    submitted: false,
                    correct: false,
                    new_streak: 0,
                    awarded_golden_card: false,
                    position: None,
                },
            });
        }

        let updated = self.store.apply_round_results(session_id, &results).await?;
        tracing::info!(
            session_id = %session_id,
            round_number,
            plays = plays.len(),
            "round scored"
        );
        self.sync
            .broadcast(
                session.room_id,
                GameEvent::RoundScored {
                    round_number,
                    leaderboard: leaderboard(&updated),
                },
            )
            .await;

        self.advance_or_complete(session_id).await?;
        Ok(())
    }

    /// Computes one participant's score delta for the round.
    async fn score_participant(
        &self,
        session: &GameSession,
        participant: &SessionParticipant,
        play: &RoundPlay,
        correct_roles: &[CSuiteRole],
    ) -> Result<RoundResult, EngineError> {
        let mut delta = self.policy.base_points(play);
        let mut new_streak = 0;
        let mut awarded_golden_card = false;
        let mut position = None;

        if play.is_correct {
            // Streak bonus keys off state carried in the participant row,
            // not recomputed from history: O(participants) per round.
            delta += self.policy.streak_bonus(participant.correct_streak);
            new_streak = participant.correct_streak + 1;
            position = Some(play.clicked_target);

            // Bingo: pattern completion only pays while slots remain, and
            // the conditional decrement picks the winners. Losing the
            // race is benign — scoring continues without the bonus.
            if !participant.has_golden_card && self.grid.contains(play.clicked_target) {
                let mut positions = participant.correct_positions.clone();
                positions.insert(play.clicked_target);
                if self.grid.completes_line(&positions) {
                    match self.store.claim_bingo_slot(session.id).await? {
                        SlotClaim::Won => {
                            delta += self.policy.bingo_bonus();
                            awarded_golden_card = true;
                            tracing::info!(
                                session_id = %session.id,
                                participant_id = %participant.id,
                                "bingo slot won"
                            );
                        }
                        SlotClaim::Lost => {
                            tracing::debug!(
                                session_id = %session.id,
                                participant_id = %participant.id,
                                "bingo pattern complete but no slots remain"
                            );
                        }
                    }
                }
            }

            delta += self.policy.synergy_bonus(&crate::SynergyContext {
                role: participant.c_suite_choice,
                correct_roles,
            });
        }

        Ok(RoundResult {
            participant_id: participant.id,
            score_delta: delta,
            submitted: true,
            correct: play.is_correct,
            new_streak,
            awarded_golden_card,
            position,
        })
    }

    /// After a scored round: advance to the next round, or seal the
    /// session and announce the winner.
    pub async fn advance_or_complete(
        &self,
        session_id: SessionId,
    ) -> Result<GameSession, EngineError> {
        let session = self.store.session(session_id).await?;
        if session.status != SessionStatus::Active {
            return Ok(session);
        }

        if session.current_round >= session.total_rounds {
            let participants = self.store.participants(session_id).await?;
            // Deterministic: concurrent completers compute the same winner.
            let winner = decide_winner(&participants);
            let cas = self.store.complete_session(session_id, winner).await?;
            if cas.applied() {
                tracing::info!(
                    session_id = %session_id,
                    winner = ?winner,
                    "game completed"
                );
                self.sync
                    .broadcast(
                        session.room_id,
                        GameEvent::GameCompleted {
                            session_id,
                            winner,
                            leaderboard: leaderboard(&participants),
                        },
                    )
                    .await;
            }
            return Ok(cas.into_record());
        }

        let from = session.current_round;
        let cas = self.store.advance_round(session_id, from).await?;
        if cas.applied() {
            self.start_round(session_id, from + 1).await
        } else {
            Ok(cas.into_record())
        }
    }

    // -- Corrections ------------------------------------------------------

    /// Applies a post-hoc score correction as a new, visible event.
    ///
    /// Totals are monotonic within a session, so only non-negative
    /// adjustments are representable; a negative delta is a validation
    /// error, not a clamped write.
    pub async fn adjust_score(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        delta: i64,
        reason: &str,
    ) -> Result<SessionParticipant, EngineError> {
        if delta < 0 {
            return Err(EngineError::Validation(
                "score adjustments must be non-negative: totals never decrease".into(),
            ));
        }
        let session = self.store.session(session_id).await?;
        let participant = self.store.participant(participant_id).await?;
        if participant.session_id != session_id {
            return Err(EngineError::NotFound(format!(
                "participant {participant_id} is not in session {session_id}"
            )));
        }

        let participant = self
            .store
            .adjust_participant_score(participant_id, delta as u32)
            .await?;
        self.sync
            .broadcast(
                session.room_id,
                GameEvent::ScoreAdjusted {
                    participant_id,
                    amount: delta as u32,
                    reason: reason.to_string(),
                },
            )
            .await;
        Ok(participant)
    }
}

/// Picks the winner: highest score, tie-broken by fewer incorrect
/// answers, then by the earlier (lower) participant id so the result is
/// stable and deterministic.
pub fn decide_winner(participants: &[SessionParticipant]) -> Option<ParticipantId> {
    participants
        .iter()
        .min_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then(a.incorrect_count.cmp(&b.incorrect_count))
                .then(a.id.cmp(&b.id))
        })
        .map(|p| p.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn participant(id: u64, score: u32, incorrect: u32) -> SessionParticipant {
        SessionParticipant {
            id: ParticipantId(id),
            session_id: SessionId(1),
            kind: ParticipantKind::Human,
            display_name: format!("p{id}"),
            total_score: score,
            has_golden_card: false,
            c_suite_choice: None,
            is_active: true,
            correct_streak: 0,
            incorrect_count: incorrect,
            correct_positions: BTreeSet::new(),
            joined_at: 0,
        }
    }

    #[test]
    fn test_decide_winner_highest_score() {
        let winner = decide_winner(&[
            participant(1, 100, 0),
            participant(2, 300, 5),
            participant(3, 200, 0),
        ]);
        assert_eq!(winner, Some(ParticipantId(2)));
    }

    #[test]
    fn test_decide_winner_tie_prefers_fewer_incorrect() {
        let winner = decide_winner(&[participant(1, 200, 3), participant(2, 200, 1)]);
        assert_eq!(winner, Some(ParticipantId(2)));
    }

    #[test]
    fn test_decide_winner_full_tie_prefers_earlier_id() {
        let winner = decide_winner(&[participant(9, 200, 1), participant(4, 200, 1)]);
        assert_eq!(winner, Some(ParticipantId(4)));
    }

    #[test]
    fn test_decide_winner_empty_field_has_no_winner() {
        assert_eq!(decide_winner(&[]), None);
    }
}
