// ABOUTME: Connection error types for comprehensive error handling across all connection operations
// ABOUTME: Provides structured error reporting with automatic conversion from underlying I/O and protocol errors

use std::io;
use thiserror::Error;

/// Comprehensive error type for connection operations.
///
/// Transport errors are distinguished from server-reported application
/// errors, and both are distinguished from the connection's own bookkeeping
/// errors (a busy stream-id table, a reply for a stream-id that timed out
/// locally, an explicit `stop()`).
#[derive(Debug, Error)]
pub enum ConnError {
    /// I/O error during network operations (connect, read, write).
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The server returned `Error{code, message}` for a routed request.
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    /// The codec could not decode a frame header or body.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// A freshly assigned stream-id collided with one still awaiting reply.
    #[error("connection busy: stream-id space exhausted")]
    Busy,

    /// The reply was requested after `stop()` was called.
    #[error("connection stopped")]
    Stopped,

    /// The caller-provided timeout elapsed before a reply arrived.
    #[error("operation timed out")]
    Timeout,

    /// A frame of an unexpected kind was received where a specific one was required.
    #[error("unexpected frame: expected {expected}, got {actual}")]
    UnexpectedFrame {
        expected: &'static str,
        actual: String,
    },

    /// The actor task exited (e.g. panicked) before replying.
    #[error("connection actor is gone")]
    ActorGone,
}

/// Result type alias for connection operations.
pub type ConnResult<T> = Result<T, ConnError>;
