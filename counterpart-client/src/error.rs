//! Client error types.

use counterpart_types::WireError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire format error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Network I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The heart-rate sender could not connect.
    #[error("heart-rate sender unavailable")]
    SenderUnavailable,

    /// Collection is already running.
    #[error("already collecting")]
    AlreadyCollecting,

    /// The sensor could not be started.
    #[error("sensor error: {0}")]
    Sensor(String),
}
