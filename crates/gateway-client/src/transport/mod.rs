//! Frame transport
//!
//! Wraps one WebSocket connection: framing, compression, and the send/receive loops.

mod codec;
mod error;
mod websocket;

pub use codec::{decode_binary, decode_text, fragment, inflate, DEFAULT_FRAGMENT_SIZE};
pub use error::{TransportError, TransportResult};
pub use websocket::{FrameTransport, TransportConfig, TransportEvent};
