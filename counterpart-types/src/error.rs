//! Error types for Counterpart wire formats.

use thiserror::Error;

/// Errors that can occur while encoding or decoding Counterpart wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Message arrived on a path this protocol does not use
    #[error("unknown message path: {0}")]
    UnknownPath(String),

    /// Payload on a known path was not understood
    #[error("invalid payload on {path}: {reason}")]
    InvalidPayload {
        /// Message path the payload arrived on.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Relay frame exceeds the maximum size
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared frame size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },
}
