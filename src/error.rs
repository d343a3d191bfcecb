//! Error types for the multiplex protocol.

use thiserror::Error;

/// Main error type for all multiplex operations.
#[derive(Debug, Error)]
pub enum MultiplexError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (structured serializer).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bind refused: the server is already bound.
    #[error("bind failed: {0}")]
    Bind(String),

    /// Start refused: the server is missing a binding or a handler.
    #[error("start failed: {0}")]
    Start(String),

    /// Structurally invalid frame; fatal for the connection it arrived on.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame exceeds the configured maximum length.
    #[error("frame of {length} bytes exceeds maximum of {max}")]
    FrameTooLarge { length: usize, max: usize },

    /// Connection closed while sending or awaiting a response.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote handler failed; carries its reified failure message.
    #[error("remote handler failure: {0}")]
    Remote(String),

    /// No response arrived for the given request id within the deadline.
    #[error("request {0} timed out")]
    RequestTimeout(u32),
}

/// Result type alias using MultiplexError.
pub type Result<T> = std::result::Result<T, MultiplexError>;
