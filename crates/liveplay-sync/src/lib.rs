//! Realtime synchronization for Liveplay.
//!
//! Keeps every connected client's view of a room converging to the
//! store's state:
//!
//! - [`EventFabric`] — best-effort named-channel pub/sub ([`LocalFabric`]
//!   in-process reference, [`FailingFabric`] for resilience tests).
//! - [`Synchronizer`] — per-room fan-out hub: applies events to local
//!   handlers and watchers *first*, then publishes over the fabric as a
//!   best-effort secondary path, and pumps the store's change feed back in
//!   as the authoritative third signal.
//!
//! Push is the fast path; the pull-based status query (in the `liveplay`
//! crate) is the designed recovery path for anything the push missed.

mod error;
mod fabric;
mod sync;

pub use error::SyncError;
pub use fabric::{room_channel, EventFabric, FailingFabric, LocalFabric};
pub use sync::{EventHandler, Synchronizer};
