//! Engine error types

use crate::protocol::CloseCode;
use crate::resolver::ResolveError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Gateway client error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// `connect` was called while a session is live
    #[error("Client is already connected")]
    AlreadyConnected,

    /// A command needs an established session
    #[error("Client is not connected")]
    NotConnected,

    /// READY did not arrive in time during `connect`
    #[error("Handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    /// `disconnect` ran while `connect` was still waiting for READY
    #[error("Disconnected before the session was established")]
    Aborted,

    /// The gateway endpoint could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The socket failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server closed the session with a status that forbids reconnecting
    #[error("Gateway closed the session with {code}: {reason}")]
    Closed { code: CloseCode, reason: String },

    /// The server broke the handshake rules
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// No heartbeat ACK within the allowed window
    #[error("Gateway stopped acknowledging heartbeats")]
    HeartbeatTimeout,

    /// The optional reconnect budget ran out
    #[error("Gave up after {0} reconnect attempts")]
    ReconnectExhausted(u32),

    /// Payload could not be serialized
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Status update with an unknown status string
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
}

impl GatewayError {
    /// Check if retrying with the same configuration cannot succeed
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::ReconnectExhausted(_))
    }

    /// Gateway close status behind the error, if any
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Closed { code, .. } => Some(*code),
            Self::Transport(e) => e.close_status().and_then(CloseCode::from_u16),
            _ => None,
        }
    }
}

/// Gateway client result type
pub type GatewayResult<T> = Result<T, GatewayError>;
