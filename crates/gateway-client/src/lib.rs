//! # gateway-client
//!
//! Client engine for a real-time gateway protocol carried over WebSocket.
//!
//! [`FrameTransport`](transport::FrameTransport) owns the socket; [`GatewayClient`]
//! runs the protocol on top of it and reports to a [`GatewayEventHandler`].

pub mod client;
pub mod connection;
pub mod events;
pub mod protocol;
pub mod resolver;
pub mod transport;

pub use client::{ClientConfig, GatewayClient, GatewayClientBuilder, GatewayError, GatewayResult, Sharding};
pub use connection::ConnectionStatus;
pub use events::{
    ChannelEventHandler, CompositeHandler, GatewayEvent, GatewayEventHandler, VoiceServerAssigned,
};
pub use resolver::{GatewayInfo, GatewayUrlResolver, HttpUrlResolver, StaticUrlResolver};
