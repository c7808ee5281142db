//! Error types for the protocol layer.
//!
//! Each crate in Liveplay defines its own error enum; a `ProtocolError`
//! always means a serialization or message-shape problem, never a storage
//! or orchestration fault.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value passed deserialization but violates protocol rules —
    /// an unknown enum string, an out-of-range field.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
