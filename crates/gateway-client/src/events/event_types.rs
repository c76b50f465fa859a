//! Gateway event types
//!
//! Dispatch names the engine consumes itself, and the event values handed to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Dispatch events handled inside the engine
///
/// Every other event name is forwarded to the caller untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalEvent {
    /// Sent after a successful Identify
    Ready,
    /// Sent after a successful Resume
    Resumed,
    /// Voice server assigned after a voice state update
    VoiceServerUpdate,
}

impl InternalEvent {
    /// Get the wire name of the event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::VoiceServerUpdate => "VOICE_SERVER_UPDATE",
        }
    }

    /// Parse an internally handled event from its wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "VOICE_SERVER_UPDATE" => Some(Self::VoiceServerUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for InternalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Voice server handed to the voice subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceServerAssigned {
    pub guild_id: String,
    pub endpoint: String,
    pub token: String,
    /// Gateway session the voice connection must present
    pub session_id: Option<String>,
}

/// Callback values as owned events, for callers that would rather await a channel
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Connected,
    Ready { session_id: String, payload: Value },
    Resumed,
    Dispatch { name: String, payload: Value },
    VoiceServerAssigned(VoiceServerAssigned),
    Disconnected,
    Fatal(String),
}

impl GatewayEvent {
    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Ready { .. } => "ready",
            Self::Resumed => "resumed",
            Self::Dispatch { name, .. } => name,
            Self::VoiceServerAssigned(_) => "voice_server_assigned",
            Self::Disconnected => "disconnected",
            Self::Fatal(_) => "fatal",
        }
    }
}
