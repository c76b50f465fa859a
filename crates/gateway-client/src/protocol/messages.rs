//! Gateway payload envelope
//!
//! Every frame on the wire, in both directions, carries one `Payload`.

use super::{
    HelloPayload, IdentifyPayload, OpCode, ReadyPayload, RequestGuildMembersPayload, ResumePayload,
    StatusUpdatePayload, VoiceServerUpdatePayload, VoiceStateUpdatePayload,
};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway payload envelope
///
/// `s` and `t` are either both present (Dispatch) or both absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Operation code
    pub op: OpCode,

    /// Event data
    #[serde(default)]
    pub d: Value,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Payload {
    fn new(op: OpCode, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    fn with_body<T: Serialize>(op: OpCode, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, serde_json::to_value(body)?))
    }

    // === Client Payloads ===

    /// Create a Heartbeat payload (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(sequence: u64) -> Self {
        Self::new(OpCode::Heartbeat, Value::from(sequence))
    }

    /// Create an Identify payload (op=2)
    pub fn identify(body: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Self::with_body(OpCode::Identify, body)
    }

    /// Create a Status Update payload (op=3)
    pub fn status_update(body: &StatusUpdatePayload) -> Result<Self, serde_json::Error> {
        Self::with_body(OpCode::StatusUpdate, body)
    }

    /// Create a Voice State Update payload (op=4)
    pub fn voice_state_update(body: &VoiceStateUpdatePayload) -> Result<Self, serde_json::Error> {
        Self::with_body(OpCode::VoiceStateUpdate, body)
    }

    /// Create a Resume payload (op=6)
    pub fn resume(body: &ResumePayload) -> Result<Self, serde_json::Error> {
        Self::with_body(OpCode::Resume, body)
    }

    /// Create a Request Guild Members payload (op=8)
    pub fn request_guild_members(
        body: &RequestGuildMembersPayload,
    ) -> Result<Self, serde_json::Error> {
        Self::with_body(OpCode::RequestGuildMembers, body)
    }

    // === Server Payloads ===

    /// Create a Dispatch payload (op=0)
    #[must_use]
    pub fn dispatch(event_name: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: data,
            s: Some(sequence),
            t: Some(event_name.into()),
        }
    }

    /// Create a Hello payload (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(
            OpCode::Hello,
            serde_json::json!({ "heartbeat_interval": heartbeat_interval }),
        )
    }

    /// Create a Heartbeat ACK payload (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, Value::Null)
    }

    /// Create a Reconnect payload (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, Value::Null)
    }

    /// Create an Invalid Session payload (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Value::Bool(resumable))
    }

    // === Parsing ===

    fn body_as<T: DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    fn dispatch_as<T: DeserializeOwned>(&self, event_name: &str) -> Option<T> {
        if self.op != OpCode::Dispatch || self.t.as_deref() != Some(event_name) {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.body_as(OpCode::Hello)
    }

    /// Try to parse as an Identify payload (op=2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.body_as(OpCode::Identify)
    }

    /// Try to parse as a Resume payload (op=6)
    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.body_as(OpCode::Resume)
    }

    /// Try to parse as a Voice State Update payload (op=4)
    pub fn as_voice_state_update(&self) -> Option<VoiceStateUpdatePayload> {
        self.body_as(OpCode::VoiceStateUpdate)
    }

    /// Try to parse the body of a `READY` dispatch
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        self.dispatch_as("READY")
    }

    /// Try to parse the body of a `VOICE_SERVER_UPDATE` dispatch
    pub fn as_voice_server_update(&self) -> Option<VoiceServerUpdatePayload> {
        self.dispatch_as("VOICE_SERVER_UPDATE")
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string, rejecting envelopes with only one of `s`/`t`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let payload: Self = serde_json::from_str(json)?;
        if payload.s.is_some() != payload.t.is_some() {
            return Err(serde_json::Error::custom(
                "sequence and event name must be present together",
            ));
        }
        Ok(payload)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "Payload(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "Payload(op={})", self.op)
        }
    }
}
