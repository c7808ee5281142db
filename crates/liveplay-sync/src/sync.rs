//! The realtime synchronizer: local-first fan-out with best-effort push.
//!
//! One logical channel per room. Every state change flows through
//! [`Synchronizer::broadcast`], which:
//!
//! 1. **Applies the event to local consumers first** — registered handlers
//!    and watch receivers in this process never depend on the network.
//! 2. **Then publishes over the event fabric, best-effort** — a failed
//!    publish is logged and swallowed. The durable state already advanced;
//!    out-of-process clients that miss the push recover by polling the
//!    status query.
//!
//! This ordering is the core resilience decision: the game's correctness
//! never depends on the pub/sub transport succeeding.
//!
//! The synchronizer also consumes the store's change feed as a third,
//! authoritative signal, so a state change written directly to the store
//! (a retried request, a redundant manager) still reaches every local
//! consumer. Handlers must therefore tolerate at-least-once delivery;
//! every core mutation is conditional at the store layer, so re-applying
//! an already-applied change is a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use liveplay_protocol::{
    Codec, EventEnvelope, EventKind, GameEvent, JsonCodec, ParticipantId, RoomId,
};
use liveplay_store::{Store, StoreChange};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::{room_channel, EventFabric};

/// Per-room buffer for watch receivers. A lagged watcher re-reads from the
/// store rather than replaying the gap.
const WATCH_CAPACITY: usize = 128;

/// A registered event handler. `Arc` so handler lists can be snapshotted
/// out of the lock before invocation.
pub type EventHandler = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

#[derive(Default)]
struct RoomChannelState {
    typed: HashMap<EventKind, Vec<EventHandler>>,
    wildcard: Vec<EventHandler>,
    watch: Option<broadcast::Sender<EventEnvelope>>,
    present: HashSet<ParticipantId>,
}

/// Per-room fan-out hub: typed handlers, wildcard handlers, watch
/// channels, and presence bookkeeping.
pub struct Synchronizer<F: EventFabric> {
    fabric: Arc<F>,
    codec: JsonCodec,
    rooms: RwLock<HashMap<RoomId, RoomChannelState>>,
}

impl<F: EventFabric> Synchronizer<F> {
    pub fn new(fabric: Arc<F>) -> Self {
        Self {
            fabric,
            codec: JsonCodec,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    // -- Subscriptions ----------------------------------------------------

    /// Registers a handler for one event type in one room.
    pub async fn subscribe<H>(&self, room_id: RoomId, kind: EventKind, handler: H)
    where
        H: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id)
            .or_default()
            .typed
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Registers a wildcard handler invoked for every event in the room.
    pub async fn subscribe_all<H>(&self, room_id: RoomId, handler: H)
    where
        H: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id)
            .or_default()
            .wildcard
            .push(Arc::new(handler));
    }

    /// Returns a receiver of every envelope applied in the room. Suited to
    /// `tokio::select!` consumers like the room cycle driver.
    pub async fn watch(&self, room_id: RoomId) -> broadcast::Receiver<EventEnvelope> {
        let mut rooms = self.rooms.write().await;
        let state = rooms.entry(room_id).or_default();
        state
            .watch
            .get_or_insert_with(|| broadcast::channel(WATCH_CAPACITY).0)
            .subscribe()
    }

    // -- Fan-out ----------------------------------------------------------

    /// Fans an event out: local consumers first, then the fabric.
    ///
    /// Infallible by design. Encode or publish failures are logged and
    /// absorbed — by the time we get here the durable state has already
    /// advanced, and remote clients can recover via the status query.
    pub async fn broadcast(&self, room_id: RoomId, event: GameEvent) {
        let envelope = EventEnvelope::new(room_id, event);

        // Phase 1: local apply. Same-process consumers never depend on the
        // fabric.
        self.apply(&envelope).await;

        // Phase 2: best-effort publish.
        let payload = match self.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%room_id, error = %e, "envelope encode failed, skipping publish");
                return;
            }
        };
        if let Err(e) = self
            .fabric
            .publish(&room_channel(room_id), &payload)
            .await
        {
            tracing::warn!(
                %room_id,
                kind = ?envelope.event.kind(),
                error = %e,
                "fabric publish failed, continuing (clients recover via status query)"
            );
        }
    }

    /// Applies an envelope to local consumers only.
    ///
    /// Safe to call more than once with the same envelope — handlers are
    /// required to be idempotent. This is also the entry point for the
    /// change-feed pump and for replaying envelopes received out-of-band.
    pub async fn apply(&self, envelope: &EventEnvelope) {
        // Snapshot handlers and the watch sender, then invoke outside the
        // lock so handlers may call back into the synchronizer.
        let (handlers, watch) = {
            let rooms = self.rooms.read().await;
            match rooms.get(&envelope.room_id) {
                Some(state) => {
                    let mut handlers: Vec<EventHandler> = Vec::new();
                    if let Some(typed) = state.typed.get(&envelope.event.kind()) {
                        handlers.extend(typed.iter().cloned());
                    }
                    handlers.extend(state.wildcard.iter().cloned());
                    (handlers, state.watch.clone())
                }
                None => return,
            }
        };

        for handler in &handlers {
            handler(envelope);
        }
        if let Some(watch) = watch {
            // No receivers is fine; watchers come and go.
            let _ = watch.send(envelope.clone());
        }
    }

    // -- Presence ---------------------------------------------------------

    /// Records a participant as connected to the room's channel. Returns
    /// the new presence count. Idempotent per participant.
    pub async fn track_presence(&self, room_id: RoomId, participant: ParticipantId) -> usize {
        let mut rooms = self.rooms.write().await;
        let state = rooms.entry(room_id).or_default();
        state.present.insert(participant);
        state.present.len()
    }

    /// Removes a participant from presence. Their play history is
    /// untouched — going offline only affects future eligibility, which
    /// the engine records separately.
    pub async fn untrack_presence(&self, room_id: RoomId, participant: ParticipantId) -> usize {
        let mut rooms = self.rooms.write().await;
        let state = rooms.entry(room_id).or_default();
        state.present.remove(&participant);
        state.present.len()
    }

    /// Number of participants currently tracked as present.
    pub async fn presence_count(&self, room_id: RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&room_id).map_or(0, |s| s.present.len())
    }

    // -- Change feed ------------------------------------------------------

    /// Spawns the change-feed pump: every store mutation is converted to
    /// its authoritative event and applied locally.
    ///
    /// The pump makes push notifications a convenience layer over the
    /// store, never the other way around. On lag it logs and keeps going —
    /// skipped records are observable through the status query.
    pub fn attach_change_feed<S: Store>(
        sync: &Arc<Synchronizer<F>>,
        store: &Arc<S>,
    ) -> JoinHandle<()> {
        let sync = Arc::clone(sync);
        let mut feed = store.subscribe_changes();
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(change) => {
                        let (room_id, event) = change_event(change);
                        sync.apply(&EventEnvelope::new(room_id, event)).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed lagged, records skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("change feed closed, pump stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Converts a store change record into its authoritative event.
fn change_event(change: StoreChange) -> (RoomId, GameEvent) {
    match change {
        StoreChange::Room(room) => (
            room.id,
            GameEvent::RoomUpdated {
                status: room.status,
                current_game_number: room.current_game_number,
                current_player_count: room.current_player_count,
                spectator_count: room.spectator_count,
            },
        ),
        StoreChange::Session(session) => (
            session.room_id,
            GameEvent::SessionUpdated {
                session_id: session.id,
                status: session.status,
                current_round: session.current_round,
                rounds_completed: session.rounds_completed,
            },
        ),
        StoreChange::Participant {
            room_id,
            participant,
        } => (
            room_id,
            GameEvent::ParticipantUpdated {
                row: participant.leaderboard_row(),
            },
        ),
        StoreChange::Play { room_id, play } => (
            room_id,
            GameEvent::PlaySubmitted {
                participant_id: play.participant_id,
                round_number: play.round_number,
                is_correct: play.is_correct,
            },
        ),
        StoreChange::SpectatorCount { room_id, count } => {
            (room_id, GameEvent::SpectatorCountChanged { count })
        }
    }
}
