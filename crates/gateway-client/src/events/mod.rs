//! Gateway events
//!
//! Dispatch routing names and the callback boundary exposed to callers and the voice subsystem.

mod event_types;
mod handler;

pub use event_types::{GatewayEvent, InternalEvent, VoiceServerAssigned};
pub use handler::{ChannelEventHandler, CompositeHandler, GatewayEventHandler, NoopHandler};
