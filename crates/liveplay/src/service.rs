//! The Liveplay service facade: wiring and the write-side API surface.
//!
//! Every collaborator is injected — the store, the fabric, the content
//! provider, the scoring policy. Nothing here is an ambient singleton:
//! the host application constructs one service, owns its lifecycle, and
//! hands out references.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use liveplay_protocol::{
    CSuiteRole, GameEvent, ParticipantId, ParticipantKind, RoomId, SessionId, SpectatorId,
    TargetId,
};
use liveplay_store::{PerpetualRoom, RoundPlay, SessionParticipant, Spectator, Store};
use liveplay_sync::{EventFabric, Synchronizer};
use liveplay_engine::{
    EngineConfig, EngineError, GameSessionEngine, PromptProvider, ScoringPolicy,
};
use liveplay_room::{
    spawn_room_cycle, DriverConfig, DriverHandle, LifecycleConfig, RoomLifecycleManager,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{LiveplayError, RoomDirectory, RoomListing, SessionStatusReport, StatusQuery};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and wiring a [`LiveplayService`].
///
/// # Example
///
/// ```rust,ignore
/// let service = LiveplayService::builder()
///     .total_rounds(9)
///     .round_time_limit(Duration::from_secs(15))
///     .intermission(Duration::from_secs(30))
///     .build(store, fabric, provider, policy);
/// ```
pub struct LiveplayBuilder {
    engine: EngineConfig,
    lifecycle: LifecycleConfig,
    driver: DriverConfig,
    max_players_per_game: u32,
}

impl LiveplayBuilder {
    pub fn new() -> Self {
        Self {
            engine: EngineConfig::default(),
            lifecycle: LifecycleConfig::default(),
            driver: DriverConfig::default(),
            max_players_per_game: 8,
        }
    }

    pub fn round_time_limit(mut self, limit: Duration) -> Self {
        self.engine.round_time_limit = limit;
        self
    }

    pub fn total_rounds(mut self, rounds: u32) -> Self {
        self.lifecycle.total_rounds = rounds;
        self
    }

    pub fn intermission(mut self, intermission: Duration) -> Self {
        self.lifecycle.intermission = intermission;
        self
    }

    pub fn bingo_slots(mut self, slots: u32) -> Self {
        self.lifecycle.bingo_slots_total = slots;
        self
    }

    pub fn join_window(mut self, window: Duration) -> Self {
        self.driver.join_window = window;
        self
    }

    pub fn max_players_per_game(mut self, max: u32) -> Self {
        self.max_players_per_game = max;
        self
    }

    /// Wires the full stack around the injected collaborators.
    pub fn build<S, F, P>(
        self,
        store: Arc<S>,
        fabric: Arc<F>,
        provider: P,
        policy: Arc<dyn ScoringPolicy>,
    ) -> LiveplayService<S, F, P>
    where
        S: Store,
        F: EventFabric,
        P: PromptProvider,
    {
        let sync = Arc::new(Synchronizer::new(fabric));
        let change_feed = Synchronizer::attach_change_feed(&sync, &store);

        let engine = Arc::new(GameSessionEngine::new(
            Arc::clone(&store),
            Arc::clone(&sync),
            provider,
            policy,
            self.engine,
        ));
        let lifecycle = Arc::new(RoomLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&sync),
            self.lifecycle,
        ));

        LiveplayService {
            query: StatusQuery::new(Arc::clone(&store)),
            directory: RoomDirectory::new(Arc::clone(&store)),
            store,
            sync,
            engine,
            lifecycle,
            driver_config: self.driver,
            max_players_per_game: self.max_players_per_game,
            drivers: Mutex::new(HashMap::new()),
            change_feed,
        }
    }
}

impl Default for LiveplayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The wired Liveplay stack: store, synchronizer, engine, lifecycle,
/// query surface, and one cycle driver per opened room.
pub struct LiveplayService<S: Store, F: EventFabric, P: PromptProvider> {
    store: Arc<S>,
    sync: Arc<Synchronizer<F>>,
    engine: Arc<GameSessionEngine<S, F, P>>,
    lifecycle: Arc<RoomLifecycleManager<S, F>>,
    query: StatusQuery<S>,
    directory: RoomDirectory<S>,
    driver_config: DriverConfig,
    max_players_per_game: u32,
    drivers: Mutex<HashMap<RoomId, DriverHandle>>,
    /// Change-feed pump task; aborted when the service is dropped.
    change_feed: JoinHandle<()>,
}

impl<S: Store, F: EventFabric, P: PromptProvider> LiveplayService<S, F, P> {
    pub fn builder() -> LiveplayBuilder {
        LiveplayBuilder::new()
    }

    // -- Accessors --------------------------------------------------------

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn sync(&self) -> &Arc<Synchronizer<F>> {
        &self.sync
    }

    pub fn engine(&self) -> &Arc<GameSessionEngine<S, F, P>> {
        &self.engine
    }

    pub fn lifecycle(&self) -> &Arc<RoomLifecycleManager<S, F>> {
        &self.lifecycle
    }

    // -- Rooms ------------------------------------------------------------

    /// Creates a new perpetual room (rare, admin-driven).
    pub async fn create_room(&self) -> Result<PerpetualRoom, LiveplayError> {
        let room = self
            .store
            .create_room(self.max_players_per_game)
            .await
            .map_err(EngineError::from)?;
        Ok(room)
    }

    /// Starts the autonomous cycle for a room. Idempotent: opening an
    /// already-open room keeps the existing driver.
    pub async fn open_room(&self, room_id: RoomId) -> Result<(), LiveplayError> {
        // Fail fast on unknown rooms before spawning anything.
        self.store.room(room_id).await.map_err(EngineError::from)?;

        let mut drivers = self.drivers.lock().await;
        drivers.entry(room_id).or_insert_with(|| {
            tracing::info!(%room_id, "room opened, cycle driver spawned");
            spawn_room_cycle(
                room_id,
                Arc::clone(&self.store),
                Arc::clone(&self.lifecycle),
                Arc::clone(&self.engine),
                Arc::clone(&self.sync),
                self.driver_config.clone(),
            )
        });
        Ok(())
    }

    /// Stops a room's cycle driver. The room record stays; a later
    /// `open_room` resumes cycling.
    pub async fn close_room(&self, room_id: RoomId) -> Result<(), LiveplayError> {
        let handle = self.drivers.lock().await.remove(&room_id);
        if let Some(handle) = handle {
            handle.shutdown().await.map_err(LiveplayError::from)?;
            tracing::info!(%room_id, "room closed");
        }
        Ok(())
    }

    // -- Participants and plays -------------------------------------------

    pub async fn join_session(
        &self,
        session_id: SessionId,
        display_name: &str,
        kind: ParticipantKind,
    ) -> Result<SessionParticipant, LiveplayError> {
        Ok(self.engine.join_session(session_id, display_name, kind).await?)
    }

    pub async fn leave_session(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<(), LiveplayError> {
        Ok(self.engine.leave_session(session_id, participant_id).await?)
    }

    pub async fn submit_play(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        round_number: u32,
        clicked_target: TargetId,
    ) -> Result<RoundPlay, LiveplayError> {
        Ok(self
            .engine
            .submit_play(session_id, participant_id, round_number, clicked_target)
            .await?)
    }

    /// The C-Suite selection write endpoint.
    ///
    /// Takes the role as the raw request string: an empty value or an
    /// unknown role is a validation error before the engine is consulted;
    /// a structurally valid pick outside round 1 is a state conflict.
    pub async fn select_c_suite(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        role: &str,
    ) -> Result<SessionParticipant, LiveplayError> {
        let role = role.trim();
        if role.is_empty() {
            return Err(EngineError::Validation("cSuiteChoice is required".into()).into());
        }
        let role: CSuiteRole = role
            .parse()
            .map_err(|e: liveplay_protocol::ProtocolError| {
                EngineError::Validation(e.to_string())
            })?;
        Ok(self.engine.select_role(session_id, participant_id, role).await?)
    }

    // -- Spectators -------------------------------------------------------

    /// Registers a passive viewer and announces the new count.
    pub async fn join_as_spectator(
        &self,
        room_id: RoomId,
    ) -> Result<Spectator, LiveplayError> {
        let spectator = self
            .store
            .add_spectator(room_id)
            .await
            .map_err(EngineError::from)?;
        let count = self
            .store
            .room(room_id)
            .await
            .map_err(EngineError::from)?
            .spectator_count;
        self.sync
            .broadcast(room_id, GameEvent::SpectatorCountChanged { count })
            .await;
        Ok(spectator)
    }

    pub async fn leave_spectator(
        &self,
        room_id: RoomId,
        spectator_id: SpectatorId,
    ) -> Result<(), LiveplayError> {
        let count = self
            .store
            .remove_spectator(spectator_id)
            .await
            .map_err(EngineError::from)?;
        self.sync
            .broadcast(room_id, GameEvent::SpectatorCountChanged { count })
            .await;
        Ok(())
    }

    // -- Read surface -----------------------------------------------------

    pub async fn session_status(
        &self,
        session_id: SessionId,
    ) -> Result<SessionStatusReport, LiveplayError> {
        self.query.session_status(session_id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomListing>, LiveplayError> {
        self.directory.list_rooms().await
    }
}

impl<S: Store, F: EventFabric, P: PromptProvider> Drop for LiveplayService<S, F, P> {
    fn drop(&mut self) {
        self.change_feed.abort();
    }
}
