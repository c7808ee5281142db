//! The room cycle driver: an actor task that keeps one perpetual room
//! cycling with no manual intervention.
//!
//! Each room gets its own Tokio task, talked to through a command channel
//! — the outside world holds a cheap [`DriverHandle`]. The loop:
//!
//! ```text
//! intermission countdown → start next game → join window
//!     → per round: enforce the deadline, follow advance events
//!     → game completed → end game → intermission countdown → …
//! ```
//!
//! The driver is the round-timeout timer that keeps games live:
//! submissions complete rounds on the fast path, and the driver forces
//! evaluation when the deadline passes. It follows progress through
//! the synchronizer's watch channel; on lag it re-reads authoritative
//! state from the store — the same pull-based fallback clients use.

use std::sync::Arc;
use std::time::Duration;

use liveplay_protocol::{now_ms, GameEvent, RoomId, RoomStatus, SessionId};
use liveplay_store::Store;
use liveplay_sync::{EventFabric, Synchronizer};
use liveplay_engine::{GameSessionEngine, PromptProvider};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use crate::{RoomError, RoomLifecycleManager};

/// Fallback poll interval when the driver has no deadline to wait on.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command channel size. The driver only receives rare control commands.
const COMMAND_CHANNEL_SIZE: usize = 8;

// ---------------------------------------------------------------------------
// Configuration / handle
// ---------------------------------------------------------------------------

/// Settings for the cycle driver itself (game settings live in
/// [`LifecycleConfig`](crate::LifecycleConfig)).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How long a pending game accepts joins before round 1 starts.
    pub join_window: Duration,
    /// How long to wait before re-checking an empty pending game.
    pub empty_recheck: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            join_window: Duration::from_secs(5),
            empty_recheck: Duration::from_secs(2),
        }
    }
}

enum DriverCommand {
    Shutdown,
}

/// Handle to a running room cycle driver. Cheap to clone.
#[derive(Clone)]
pub struct DriverHandle {
    room_id: RoomId,
    sender: mpsc::Sender<DriverCommand>,
}

impl DriverHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Stops the driver loop. The room is left in whatever state it was
    /// in; a new driver can be spawned to resume the cycle.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(DriverCommand::Shutdown)
            .await
            .map_err(|_| RoomError::DriverStopped(self.room_id))
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawns the cycle driver task for a room and returns its handle.
pub fn spawn_room_cycle<S, F, P>(
    room_id: RoomId,
    store: Arc<S>,
    lifecycle: Arc<RoomLifecycleManager<S, F>>,
    engine: Arc<GameSessionEngine<S, F, P>>,
    sync: Arc<Synchronizer<F>>,
    config: DriverConfig,
) -> DriverHandle
where
    S: Store,
    F: EventFabric,
    P: PromptProvider,
{
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let driver = RoomCycleDriver {
        room_id,
        store,
        lifecycle,
        engine,
        sync,
        config,
        receiver: rx,
    };
    tokio::spawn(driver.run());
    DriverHandle {
        room_id,
        sender: tx,
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// What the driver should do next inside a game.
enum GameStep {
    /// Wait until this deadline (the round's end, or a short poll).
    Wait(Instant),
    /// The session is completed; move the room to intermission.
    Completed,
}

struct RoomCycleDriver<S: Store, F: EventFabric, P: PromptProvider> {
    room_id: RoomId,
    store: Arc<S>,
    lifecycle: Arc<RoomLifecycleManager<S, F>>,
    engine: Arc<GameSessionEngine<S, F, P>>,
    sync: Arc<Synchronizer<F>>,
    config: DriverConfig,
    receiver: mpsc::Receiver<DriverCommand>,
}

impl<S: Store, F: EventFabric, P: PromptProvider> RoomCycleDriver<S, F, P> {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, "room cycle driver started");

        loop {
            let room = match self.store.room(self.room_id).await {
                Ok(room) => room,
                Err(e) => {
                    tracing::error!(room_id = %self.room_id, error = %e, "room lookup failed");
                    break;
                }
            };

            let keep_going = match (room.status, room.current_session) {
                (RoomStatus::Intermission, _) => self.rest_phase(&room).await,
                (RoomStatus::Active, Some(session_id)) => self.game_phase(session_id).await,
                (RoomStatus::Active, None) => {
                    tracing::error!(
                        room_id = %self.room_id,
                        "active room has no session, stopping driver"
                    );
                    false
                }
            };
            if !keep_going {
                break;
            }
        }

        tracing::info!(room_id = %self.room_id, "room cycle driver stopped");
    }

    /// Waits out the intermission, then starts the next game.
    async fn rest_phase(&mut self, room: &liveplay_store::PerpetualRoom) -> bool {
        let wait = crate::estimate_wait(room);
        tokio::select! {
            _ = time::sleep(wait) => {}
            cmd = self.receiver.recv() => return handle_command(cmd),
        }

        match self.lifecycle.start_next_game(self.room_id).await {
            Ok(session_id) => {
                tracing::debug!(room_id = %self.room_id, %session_id, "cycle: game up");
                true
            }
            // Clock skew between our sleep and the stored schedule; the
            // outer loop re-reads and waits out the remainder.
            Err(RoomError::IntermissionNotOver(_, remaining)) => {
                tracing::debug!(room_id = %self.room_id, ?remaining, "intermission not over yet");
                true
            }
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "start_next_game failed");
                time::sleep(self.config.empty_recheck).await;
                true
            }
        }
    }

    /// Runs one game to completion: join window, round deadlines, end.
    async fn game_phase(&mut self, session_id: SessionId) -> bool {
        // Watch before starting anything so no advance event is missed.
        let mut events = self.sync.watch(self.room_id).await;

        if !self.join_window(session_id).await {
            return false;
        }

        let mut deadline = match self.game_step(session_id).await {
            Ok(GameStep::Wait(deadline)) => deadline,
            Ok(GameStep::Completed) => return self.finish_game(session_id).await,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "game setup failed");
                return true;
            }
        };

        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => {
                    // The deadline is the liveness guarantee: force the
                    // completion decision for whatever round is current.
                    let session = match self.store.session(session_id).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::error!(session_id = %session_id, error = %e, "session lookup failed");
                            return true;
                        }
                    };
                    if let Err(e) = self
                        .engine
                        .evaluate_round_completion(session_id, session.current_round)
                        .await
                    {
                        tracing::warn!(session_id = %session_id, error = %e, "evaluation failed");
                    }
                    match self.game_step(session_id).await {
                        Ok(GameStep::Wait(next)) => deadline = next,
                        Ok(GameStep::Completed) => return self.finish_game(session_id).await,
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "game step failed");
                            deadline = Instant::now() + POLL_INTERVAL;
                        }
                    }
                }

                event = events.recv() => match event {
                    Ok(envelope) => match envelope.event {
                        GameEvent::RoundStarted { ends_at, round_number, .. } => {
                            tracing::debug!(
                                session_id = %session_id,
                                round_number,
                                "cycle: following new round deadline"
                            );
                            deadline = deadline_instant(ends_at);
                        }
                        GameEvent::GameCompleted { session_id: done, .. } if done == session_id => {
                            return self.finish_game(session_id).await;
                        }
                        _ => {}
                    },
                    // Missed events: fall back to authoritative state,
                    // exactly like a lagging client would.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(session_id = %session_id, skipped, "event watch lagged, re-syncing");
                        match self.game_step(session_id).await {
                            Ok(GameStep::Wait(next)) => deadline = next,
                            Ok(GameStep::Completed) => return self.finish_game(session_id).await,
                            Err(e) => {
                                tracing::warn!(session_id = %session_id, error = %e, "re-sync failed");
                                deadline = Instant::now() + POLL_INTERVAL;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::error!(session_id = %session_id, "event watch closed");
                        return true;
                    }
                },

                cmd = self.receiver.recv() => return handle_command(cmd),
            }
        }
    }

    /// Holds the pending game open for joins; refuses to start an empty
    /// game (keeps waiting instead — a perpetual room is patient).
    async fn join_window(&mut self, session_id: SessionId) -> bool {
        loop {
            let session = match self.store.session(session_id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "session lookup failed");
                    return true;
                }
            };
            if session.status != liveplay_protocol::SessionStatus::Pending {
                // Round 1 already started (another driver, or a resume).
                return true;
            }

            tokio::select! {
                _ = time::sleep(self.config.join_window) => {}
                cmd = self.receiver.recv() => return handle_command(cmd),
            }

            let session = match self.store.session(session_id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "session lookup failed");
                    return true;
                }
            };
            if session.total_participants > 0 {
                return true;
            }
            tracing::debug!(
                session_id = %session_id,
                "no participants yet, holding the join window open"
            );
            tokio::select! {
                _ = time::sleep(self.config.empty_recheck) => {}
                cmd = self.receiver.recv() => return handle_command(cmd),
            }
        }
    }

    /// Reads authoritative state and decides the next wait — healing any
    /// half-finished transition it finds (a round left scored but not
    /// advanced, or no round in flight).
    async fn game_step(&self, session_id: SessionId) -> Result<GameStep, RoomError> {
        use liveplay_protocol::RoundStage;

        // A couple of healing attempts at most; anything still unsettled
        // is re-examined after a short poll.
        for _ in 0..3 {
            let session = self.store.session(session_id).await?;
            if session.is_completed() {
                return Ok(GameStep::Completed);
            }
            match &session.round {
                Some(round) if round.stage == RoundStage::Collecting => {
                    return Ok(GameStep::Wait(deadline_instant(round.ends_at)));
                }
                Some(_) => {
                    // Scored but not yet advanced: push it along.
                    self.engine.advance_or_complete(session_id).await?;
                }
                None => {
                    self.engine
                        .start_round(session_id, session.current_round)
                        .await?;
                }
            }
        }
        Ok(GameStep::Wait(Instant::now() + POLL_INTERVAL))
    }

    /// Moves the room into intermission after a completed game.
    async fn finish_game(&self, session_id: SessionId) -> bool {
        if let Err(e) = self.lifecycle.end_game(self.room_id, session_id).await {
            tracing::warn!(
                room_id = %self.room_id,
                session_id = %session_id,
                error = %e,
                "end_game failed"
            );
        }
        true
    }
}

/// Converts an epoch-ms deadline into a Tokio instant, flooring at "now"
/// for deadlines already in the past.
fn deadline_instant(ends_at_ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(ends_at_ms.saturating_sub(now_ms()))
}

/// Shared command handling: `false` stops the driver loop.
fn handle_command(cmd: Option<DriverCommand>) -> bool {
    match cmd {
        // Explicit shutdown, or every handle dropped — either way, stop.
        Some(DriverCommand::Shutdown) | None => false,
    }
}
