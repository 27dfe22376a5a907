//! Error types for the relay
//!
//! Defines application-level errors, per-connection send errors and
//! configuration errors. Uses thiserror for ergonomic error definitions.
//!
//! Rate-limit refusals and blank input are not errors; they are
//! reported through `Admission` and `Outcome` instead.

use thiserror::Error;

/// Application-level errors
///
/// Raised by the WebSocket endpoint and the binary. All of them end
/// the affected connection (or the process, for startup failures).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid startup configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Message send errors
///
/// Occurs when delivering to a connection whose channel cannot take it.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}
