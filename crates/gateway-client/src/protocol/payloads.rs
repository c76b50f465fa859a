//! Payload body definitions
//!
//! Typed `d` bodies for the payloads this client sends or inspects.

use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to authenticate a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Whether the server may send zlib-compressed binary frames
    pub compress: bool,

    /// Member count above which offline members are not sent for a guild
    pub large_threshold: u32,

    /// `[shard_id, shard_count]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

impl IdentifyPayload {
    /// Default large guild threshold
    pub const DEFAULT_LARGE_THRESHOLD: u32 = 250;

    /// Create an Identify payload with compression enabled and the default threshold
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: IdentifyProperties::default(),
            compress: true,
            large_threshold: Self::DEFAULT_LARGE_THRESHOLD,
            shard: None,
        }
    }

    /// Set the large guild threshold
    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = threshold;
        self
    }

    /// Set the shard assignment
    #[must_use]
    pub fn with_shard(mut self, shard_id: u32, shard_count: u32) -> Self {
        self.shard = Some([shard_id, shard_count]);
        self
    }
}

/// Client connection properties
///
/// Opaque metadata; the server does not change behavior based on these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(rename = "$os")]
    pub os: String,

    /// Library name
    #[serde(rename = "$browser")]
    pub browser: String,

    /// Device name
    #[serde(rename = "$device")]
    pub device: String,

    #[serde(rename = "$referrer")]
    pub referrer: String,

    #[serde(rename = "$referring_domain")]
    pub referring_domain: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
            referrer: String::new(),
            referring_domain: String::new(),
        }
    }
}

/// Payload for op 6 (Resume)
///
/// Sent by the client to resume a disconnected session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Body of the `READY` dispatch
///
/// Only the fields the engine needs; the full body is handed to the caller untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Session identifier required for Resume
    pub session_id: String,

    /// Protocol version the server speaks
    #[serde(default, rename = "v", skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,
}

/// Payload for op 4 (Voice State Update)
///
/// Asks the server to move this session into (or out of) a voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdatePayload {
    pub guild_id: String,

    /// `None` leaves voice in this guild
    pub channel_id: Option<String>,

    pub self_mute: bool,

    pub self_deaf: bool,

    /// Current gateway session, for the voice subsystem to pair with the server assignment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Body of the `VOICE_SERVER_UPDATE` dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceServerUpdatePayload {
    pub token: String,

    pub guild_id: String,

    /// Voice host; `None` while the server is still allocating one
    pub endpoint: Option<String>,
}

/// Payload for op 3 (Status Update)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    /// Unix time in milliseconds the client went idle
    pub since: Option<u64>,

    /// Activity shown next to the user
    pub game: Option<Activity>,

    /// online, dnd, idle, invisible or offline
    pub status: String,

    pub afk: bool,
}

impl StatusUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] =
        &["online", "dnd", "idle", "invisible", "offline"];

    /// Create a status update with no activity
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            since: None,
            game: None,
            status: status.into(),
            afk: false,
        }
    }

    /// Set the displayed activity
    #[must_use]
    pub fn with_game(mut self, name: impl Into<String>) -> Self {
        self.game = Some(Activity {
            name: name.into(),
            kind: 0,
        });
        self
    }

    /// Mark the client idle since the given Unix time in milliseconds
    #[must_use]
    pub fn idle_since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self.afk = true;
        self
    }

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// Activity shown in a status update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: u8,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    pub guild_id: String,

    /// Username prefix to match, empty for all members
    pub query: String,

    /// Maximum number of members to return, 0 for no limit
    pub limit: u32,
}
