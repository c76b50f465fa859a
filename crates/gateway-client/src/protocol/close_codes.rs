//! Gateway close statuses
//!
//! A server ends the socket with one of these; [`CloseAction`] is what the
//! client does next.

use serde::{Deserialize, Serialize};

/// Close statuses in the 4000 range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    /// We sent something before Identify
    NotAuthenticated = 4003,
    /// The token was rejected
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    /// The sequence in our Resume is not known to the server
    InvalidSequence = 4007,
    RateLimited = 4008,
    /// The session expired server-side
    SessionTimeout = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
}

/// Client reaction to a close status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Reconnect and resume the stored session
    Resume,
    /// Reconnect with a fresh Identify
    Identify,
    /// Give up; the same token and shard setup would be rejected again
    Stop,
}

impl CloseAction {
    /// Reaction to any close status, including ones outside the gateway range
    #[must_use]
    pub fn for_status(status: u16) -> Self {
        CloseCode::from_u16(status).map_or(Self::Resume, CloseCode::action)
    }
}

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        let code = match value {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimeout,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            _ => return None,
        };
        Some(code)
    }

    #[must_use]
    pub const fn action(self) -> CloseAction {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion => CloseAction::Stop,
            Self::NotAuthenticated | Self::InvalidSequence | Self::SessionTimeout => {
                CloseAction::Identify
            }
            Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::AlreadyAuthenticated
            | Self::RateLimited => CloseAction::Resume,
        }
    }

    /// Check if the engine may open another socket after this status
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(self.action(), CloseAction::Stop)
    }

    /// Check if the stored session is dead and the next handshake must Identify
    #[must_use]
    pub const fn requires_fresh_session(self) -> bool {
        matches!(self.action(), CloseAction::Identify)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "unknown error",
            Self::UnknownOpcode => "unknown opcode",
            Self::DecodeError => "undecodable payload",
            Self::NotAuthenticated => "not authenticated",
            Self::AuthenticationFailed => "authentication failed",
            Self::AlreadyAuthenticated => "already authenticated",
            Self::InvalidSequence => "invalid resume sequence",
            Self::RateLimited => "rate limited",
            Self::SessionTimeout => "session timed out",
            Self::InvalidShard => "invalid shard",
            Self::ShardingRequired => "sharding required",
            Self::InvalidApiVersion => "invalid gateway version",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", *self as u16, self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}
