//! Shared vocabulary for Liveplay.
//!
//! This crate defines the types every other layer speaks:
//!
//! - **Identity** ([`RoomId`], [`SessionId`], [`ParticipantId`], …) —
//!   newtype ids that keep the layers honest about what refers to what.
//! - **Statuses** ([`RoomStatus`], [`SessionStatus`], [`RoundStage`]) —
//!   the room and session state machines' states.
//! - **Events** ([`EventEnvelope`], [`GameEvent`], [`EventKind`]) — the
//!   tagged notification envelope fanned out to connected viewers.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how envelopes become bytes.
//!
//! The protocol layer knows nothing about storage, rooms, or scoring — it
//! is the common language, not a participant.

mod codec;
mod error;
mod time;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use time::now_ms;
pub use types::{
    CSuiteRole, EventEnvelope, EventKind, GameEvent, LeaderboardRow, ParticipantId,
    ParticipantKind, PlayId, RoomId, RoomStatus, RoundStage, SessionId, SessionStatus,
    SpectatorId, TargetId,
};
