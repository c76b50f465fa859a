//! Gateway protocol definitions
//!
//! Defines the wire protocol including op codes, the payload envelope, and close codes.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use messages::Payload;
pub use opcodes::OpCode;
pub use payloads::{
    Activity, HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload,
    RequestGuildMembersPayload, ResumePayload, StatusUpdatePayload, VoiceServerUpdatePayload,
    VoiceStateUpdatePayload,
};
