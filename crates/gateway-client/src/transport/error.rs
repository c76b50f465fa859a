//! Transport error types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Frame transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket never reached the open state
    #[error("WebSocket handshake failed: {0}")]
    HandshakeFailed(#[source] tungstenite::Error),

    /// The server sent a close frame
    #[error("Remote closed the connection ({code}): {reason}")]
    RemoteClosed { code: u16, reason: String },

    /// The socket faulted while we were not closing it
    #[error("Connection faulted: {0}")]
    Faulted(#[source] tungstenite::Error),

    /// The stream ended without a close frame
    #[error("Connection closed prematurely")]
    ConnectionLost,

    /// A binary frame could not be inflated
    #[error("Failed to inflate binary frame: {0}")]
    Inflate(#[source] std::io::Error),

    /// A frame did not decode to UTF-8 text
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A frame did not decode to a payload
    #[error("Invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The transport is closing or closed and accepts no more frames
    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    /// Check if this error ends the connection (as opposed to spoiling a single frame)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed(_) | Self::RemoteClosed { .. } | Self::Faulted(_) | Self::ConnectionLost | Self::Closed
        )
    }

    /// Close status carried by the error, if the server supplied one
    #[must_use]
    pub const fn close_status(&self) -> Option<u16> {
        match self {
            Self::RemoteClosed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Transport result type
pub type TransportResult<T> = Result<T, TransportError>;
