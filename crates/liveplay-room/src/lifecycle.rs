//! The room lifecycle manager: keeps a perpetual room cycling between
//! `Active` and `Intermission`.
//!
//! Every transition is a conditional write against the store, so the
//! manager is safe to run redundantly: when two timers race to start the
//! next game, the loser's failed conditional write is
//! success-by-observation — somebody started the game, which is all the
//! caller wanted to ensure.

use std::sync::Arc;
use std::time::Duration;

use liveplay_protocol::{now_ms, GameEvent, RoomId, RoomStatus, SessionId};
use liveplay_store::{Cas, NewSession, PerpetualRoom, Store};
use liveplay_sync::{EventFabric, Synchronizer};

use crate::RoomError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for the games a lifecycle manager creates.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Rest period between games.
    pub intermission: Duration,
    /// Rounds per game.
    pub total_rounds: u32,
    /// Limited bingo-bonus supply per game.
    pub bingo_slots_total: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            intermission: Duration::from_secs(30),
            total_rounds: 9,
            bingo_slots_total: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Wait estimates
// ---------------------------------------------------------------------------

/// Pure wait estimate at a given wall-clock instant.
///
/// Intermission: time until the scheduled next game, floored at zero.
/// Active: the room's average game duration — a rough figure for a
/// spectator deciding whether to watch or wait.
pub fn estimate_wait_at(room: &PerpetualRoom, now: u64) -> Duration {
    match room.status {
        RoomStatus::Intermission => {
            let starts = room.next_game_starts_at.unwrap_or(now);
            Duration::from_millis(starts.saturating_sub(now))
        }
        RoomStatus::Active => Duration::from_millis(room.avg_game_duration_ms),
    }
}

/// [`estimate_wait_at`] against the current clock.
pub fn estimate_wait(room: &PerpetualRoom) -> Duration {
    estimate_wait_at(room, now_ms())
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Drives a room's `Active ↔ Intermission` state machine.
pub struct RoomLifecycleManager<S: Store, F: EventFabric> {
    store: Arc<S>,
    sync: Arc<Synchronizer<F>>,
    config: LifecycleConfig,
}

impl<S: Store, F: EventFabric> RoomLifecycleManager<S, F> {
    pub fn new(store: Arc<S>, sync: Arc<Synchronizer<F>>, config: LifecycleConfig) -> Self {
        Self {
            store,
            sync,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Starts the next game once the intermission has elapsed.
    ///
    /// Idempotent under concurrent timers: if the room is already active,
    /// the already-linked session id is returned as a no-op success and
    /// the game number has moved exactly once.
    pub async fn start_next_game(&self, room_id: RoomId) -> Result<SessionId, RoomError> {
        self.start_game_inner(room_id, false).await
    }

    /// Starts the next game immediately, ignoring the countdown.
    pub async fn force_start_next_game(&self, room_id: RoomId) -> Result<SessionId, RoomError> {
        self.start_game_inner(room_id, true).await
    }

    async fn start_game_inner(&self, room_id: RoomId, force: bool) -> Result<SessionId, RoomError> {
        let room = self.store.room(room_id).await?;

        if room.status == RoomStatus::Intermission && !force {
            let now = now_ms();
            if let Some(starts) = room.next_game_starts_at {
                if starts > now {
                    return Err(RoomError::IntermissionNotOver(
                        room_id,
                        Duration::from_millis(starts - now),
                    ));
                }
            }
        }

        let cas = self
            .store
            .activate_room(
                room_id,
                NewSession {
                    total_rounds: self.config.total_rounds,
                    bingo_slots_total: self.config.bingo_slots_total,
                },
            )
            .await?;

        match cas {
            Cas::Applied((room, session_id)) => {
                tracing::info!(
                    %room_id,
                    %session_id,
                    game_number = room.current_game_number,
                    "next game started"
                );
                self.sync
                    .broadcast(
                        room_id,
                        GameEvent::GameStarting {
                            session_id,
                            game_number: room.current_game_number,
                        },
                    )
                    .await;
                Ok(session_id)
            }
            // Another manager's timer won the race. That game is the one
            // we were trying to start.
            Cas::Conflict((_, session_id)) => {
                tracing::debug!(%room_id, %session_id, "game already started by another caller");
                Ok(session_id)
            }
        }
    }

    /// Puts the room into intermission after a completed game.
    ///
    /// Schedules the next game, folds the game's duration into the running
    /// average, and announces the intermission. A lost conditional write
    /// means another manager already did this — returned as success.
    pub async fn end_game(
        &self,
        room_id: RoomId,
        session_id: SessionId,
    ) -> Result<PerpetualRoom, RoomError> {
        let session = self.store.session(session_id).await?;
        if !session.is_completed() {
            return Err(RoomError::SessionNotCompleted(session_id));
        }

        let duration_ms = match (session.started_at, session.completed_at) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            // A game nobody joined never started a round; count it as
            // instantaneous.
            _ => 0,
        };
        let next_start = now_ms() + self.config.intermission.as_millis() as u64;

        let cas = self.store.rest_room(room_id, next_start, duration_ms).await?;
        let room = match cas {
            Cas::Applied(room) => {
                tracing::info!(
                    %room_id,
                    games_played = room.total_games_played,
                    avg_ms = room.avg_game_duration_ms,
                    "intermission started"
                );
                self.sync
                    .broadcast(
                        room_id,
                        GameEvent::IntermissionStarted {
                            next_game_starts_at: next_start,
                            total_games_played: room.total_games_played,
                        },
                    )
                    .await;
                room
            }
            Cas::Conflict(room) => {
                tracing::debug!(%room_id, "room already resting");
                room
            }
        };
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(status: RoomStatus, next: Option<u64>, avg_ms: u64) -> PerpetualRoom {
        PerpetualRoom {
            id: RoomId(1),
            room_code: "ABCDEF".into(),
            status,
            max_players_per_game: 8,
            current_game_number: 3,
            current_session: None,
            current_player_count: 0,
            spectator_count: 0,
            total_games_played: 3,
            avg_game_duration_ms: avg_ms,
            next_game_starts_at: next,
            created_at: 0,
        }
    }

    #[test]
    fn test_estimate_wait_counts_down_intermission() {
        let r = room(RoomStatus::Intermission, Some(10_000), 0);
        assert_eq!(estimate_wait_at(&r, 4_000), Duration::from_millis(6_000));
    }

    #[test]
    fn test_estimate_wait_floors_at_zero_when_overdue() {
        let r = room(RoomStatus::Intermission, Some(10_000), 0);
        assert_eq!(estimate_wait_at(&r, 25_000), Duration::ZERO);
    }

    #[test]
    fn test_estimate_wait_uses_average_while_active() {
        let r = room(RoomStatus::Active, None, 90_000);
        assert_eq!(estimate_wait_at(&r, 0), Duration::from_millis(90_000));
    }
}
