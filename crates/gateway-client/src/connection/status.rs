//! Connection status

use serde::{Deserialize, Serialize};

/// Lifecycle status of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionStatus {
    /// Not connected; `connect` may be called
    #[default]
    Disconnected,
    /// Resolving the URL and opening the socket
    Connecting,
    /// Socket open, waiting for Hello
    AwaitingHello,
    /// Identify sent, waiting for READY
    Identifying,
    /// READY or RESUMED received
    Connected,
    /// Session lost; reopening the socket or waiting for RESUMED
    Reconnecting,
    /// A non-recoverable failure was reported; the engine will not reconnect
    FatallyClosed,
}

impl ConnectionStatus {
    /// Check if the engine is in a terminal status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::FatallyClosed)
    }

    /// Check if dispatches are flowing
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Get the name of this status
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::Identifying => "Identifying",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::FatallyClosed => "FatallyClosed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
