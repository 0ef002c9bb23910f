//! Error types for zwire-client.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all zwire operations.
#[derive(Debug, Error)]
pub enum ZwireError {
    /// I/O error on the control socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing violation (bad marker, version skew, length below header).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A decoder ran past the end of a message body.
    #[error("truncated message body: needed {needed} more bytes")]
    Truncated {
        /// How many bytes the decoder still wanted.
        needed: usize,
    },

    /// No connection to the route manager; the caller may retry after
    /// observing reconnection.
    #[error("not connected")]
    NotConnected,

    /// The peer closed the connection mid-operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// The consecutive-failure cap was reached; connect retries stay off
    /// until an external reset.
    #[error("connect retries exhausted after {failures} failures")]
    RetriesExhausted {
        /// Consecutive failures observed when the cap was hit.
        failures: u32,
    },

    /// A configured server path does not resolve to a UNIX socket file.
    #[error("`{0}` is not a unix socket")]
    NotASocket(PathBuf),
}

/// Result type alias using ZwireError.
pub type Result<T> = std::result::Result<T, ZwireError>;
