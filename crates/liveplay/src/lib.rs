//! # Liveplay
//!
//! A perpetual multiplayer room and round-based game-session
//! orchestrator: long-lived rooms cycle continuously between games and
//! intermissions, concurrent participants submit answers round-by-round,
//! scores and limited-supply bonuses are computed without double-counting,
//! and every state change fans out to connected viewers with resilience
//! to delivery failure.
//!
//! ## Architecture
//!
//! ```text
//! liveplay (this crate)  ← query surface, service facade, unified error
//!   ├── liveplay-room    ← Active ↔ Intermission cycling, cycle driver
//!   ├── liveplay-engine  ← round state machine, scoring, bonuses
//!   ├── liveplay-sync    ← local-first fan-out over a best-effort fabric
//!   ├── liveplay-store   ← conditional-update records, change feed
//!   └── liveplay-protocol← ids, statuses, event envelopes, codecs
//! ```
//!
//! Correctness never depends on the pub/sub transport: state advances
//! through conditional writes at the store, pushes are a convenience, and
//! the pull-based [`StatusQuery`] is the designed recovery path.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use liveplay::prelude::*;
//!
//! # #[tokio::main] async fn main() -> Result<(), LiveplayError> {
//! let store = Arc::new(MemoryStore::new());
//! let fabric = Arc::new(LocalFabric::new());
//! let provider = StaticPromptSet::career_defaults(&BingoGrid::default());
//!
//! let service = LiveplayBuilder::new()
//!     .total_rounds(9)
//!     .build(store, fabric, provider, Arc::new(StandardScoring::default()));
//!
//! let room = service.create_room().await?;
//! service.open_room(room.id).await?; // cycles forever from here
//! # Ok(()) }
//! ```

mod error;
mod query;
mod service;

pub use error::LiveplayError;
pub use query::{
    RoomDirectory, RoomListing, RoundCompleteness, SessionStatusReport, SessionSummary,
    StatusQuery,
};
pub use service::{LiveplayBuilder, LiveplayService};

/// One-stop imports for applications embedding Liveplay.
pub mod prelude {
    pub use crate::{
        LiveplayBuilder, LiveplayError, LiveplayService, RoomListing, SessionStatusReport,
    };
    pub use liveplay_protocol::{
        CSuiteRole, EventEnvelope, EventKind, GameEvent, ParticipantId, ParticipantKind,
        RoomId, RoomStatus, SessionId, SessionStatus, TargetId,
    };
    pub use liveplay_store::{MemoryStore, Store};
    pub use liveplay_sync::{EventFabric, LocalFabric, Synchronizer};
    pub use liveplay_engine::{
        BingoGrid, EngineConfig, GameSessionEngine, PromptProvider, ScoringPolicy,
        StandardScoring, StaticPromptSet,
    };
    pub use liveplay_room::{estimate_wait, LifecycleConfig, RoomLifecycleManager};
}
