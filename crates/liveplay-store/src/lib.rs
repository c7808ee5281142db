//! Durable-record storage for Liveplay.
//!
//! This crate owns the entities the system persists and the interface
//! through which every other layer mutates them:
//!
//! 1. **Models** ([`PerpetualRoom`], [`GameSession`], [`SessionParticipant`],
//!    [`RoundPlay`], [`Spectator`]) — the records of truth.
//! 2. **The [`Store`] trait** — conditional/atomic updates plus a
//!    change-notification feed. Correctness lives here: play uniqueness,
//!    status CAS transitions, and the bingo-slot compare-and-decrement.
//! 3. **[`MemoryStore`]** — the in-memory reference implementation.
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine / Room layers (above)  ← decide WHAT transition to attempt
//!     ↕
//! Store layer (this crate)      ← decides WHO wins each transition
//!     ↕
//! Protocol layer (below)        ← ids, statuses, shared vocabulary
//! ```
//!
//! The store is an injected collaborator, never an ambient singleton:
//! construct one, wrap it in an `Arc`, and hand it to the layers above.

mod error;
mod memory;
mod model;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use model::{
    leaderboard, ActiveRound, GameSession, PerpetualRoom, RoundPlay, SessionParticipant,
    Spectator,
};
pub use store::{
    Cas, NewParticipant, NewPlay, NewSession, RoundResult, SlotClaim, Store, StoreChange,
};
