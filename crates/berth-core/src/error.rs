//! Error types for berth-core.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during orchestration operations.
///
/// Expected, recoverable negative outcomes (an image that does not exist,
/// for instance) are reported as `Ok(false)` by the operations themselves;
/// these variants cover the unexpected paths. `Timeout` is kept distinct
/// from `NotFound` and non-zero exits so callers can decide whether to
/// retry with a longer deadline.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced container, network, or image does not exist at call time.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already in use (container or network creation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A bounded operation's deadline elapsed before completion.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed command string (unterminated quote, no tokens).
    #[error("parse error: {0}")]
    Parse(String),

    /// Engine communication failure at the socket or process-spawn level.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine accepted the request and rejected it.
    #[error("engine error: {0}")]
    Engine(String),

    /// Options rejected before reaching the engine.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
