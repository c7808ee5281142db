//! Perpetual room lifecycle for Liveplay.
//!
//! A perpetual room never closes: it cycles between an active game and a
//! timed intermission for as long as the process runs.
//!
//! - [`RoomLifecycleManager`] — the `Active ↔ Intermission` transitions,
//!   safe to run redundantly (conditional writes; lost races are
//!   success-by-observation).
//! - [`spawn_room_cycle`] / [`DriverHandle`] — the per-room actor task
//!   that makes the cycle autonomous: intermission countdowns, join
//!   windows, and the round-deadline timer that guarantees liveness.
//! - [`estimate_wait`] — the projection a room browser shows spectators.

mod driver;
mod error;
mod lifecycle;

pub use driver::{spawn_room_cycle, DriverConfig, DriverHandle};
pub use error::RoomError;
pub use lifecycle::{
    estimate_wait, estimate_wait_at, LifecycleConfig, RoomLifecycleManager,
};
