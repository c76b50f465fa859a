//! Event handler boundary
//!
//! Callbacks run on the engine's supervisor task and should return quickly.

use super::{GatewayEvent, VoiceServerAssigned};
use crate::client::GatewayError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives lifecycle and dispatch callbacks from the engine
///
/// Every method has a no-op default, so implementors override only what they need.
pub trait GatewayEventHandler: Send + Sync {
    /// Session reached Connected (after READY or RESUMED)
    fn on_connected(&self) {}

    /// READY received with the assigned session ID and the full body
    fn on_ready(&self, _session_id: &str, _payload: &Value) {}

    /// RESUMED received; missed events have been replayed
    fn on_resumed(&self) {}

    /// Any dispatch the engine does not consume itself
    fn on_unhandled_event(&self, _name: &str, _payload: &Value) {}

    /// The server assigned a voice host after a voice state update
    fn on_voice_server_assigned(&self, _voice: &VoiceServerAssigned) {}

    /// The engine entered Disconnected after `disconnect`
    fn on_disconnected(&self) {}

    /// A non-recoverable failure; no further callbacks follow until the next `connect`
    fn on_fatal_error(&self, _error: &GatewayError) {}
}

/// Handler that ignores every callback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl GatewayEventHandler for NoopHandler {}

/// Forwards every callback as a [`GatewayEvent`] into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelEventHandler {
    /// Create the handler and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, event: GatewayEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

impl GatewayEventHandler for ChannelEventHandler {
    fn on_connected(&self) {
        self.emit(GatewayEvent::Connected);
    }

    fn on_ready(&self, session_id: &str, payload: &Value) {
        self.emit(GatewayEvent::Ready {
            session_id: session_id.to_string(),
            payload: payload.clone(),
        });
    }

    fn on_resumed(&self) {
        self.emit(GatewayEvent::Resumed);
    }

    fn on_unhandled_event(&self, name: &str, payload: &Value) {
        self.emit(GatewayEvent::Dispatch {
            name: name.to_string(),
            payload: payload.clone(),
        });
    }

    fn on_voice_server_assigned(&self, voice: &VoiceServerAssigned) {
        self.emit(GatewayEvent::VoiceServerAssigned(voice.clone()));
    }

    fn on_disconnected(&self) {
        self.emit(GatewayEvent::Disconnected);
    }

    fn on_fatal_error(&self, error: &GatewayError) {
        self.emit(GatewayEvent::Fatal(error.to_string()));
    }
}

/// Fans each callback out to several handlers, in registration order
#[derive(Clone, Default)]
pub struct CompositeHandler {
    handlers: Vec<Arc<dyn GatewayEventHandler>>,
}

impl CompositeHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler
    #[must_use]
    pub fn with(mut self, handler: Arc<dyn GatewayEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CompositeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeHandler")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl GatewayEventHandler for CompositeHandler {
    fn on_connected(&self) {
        self.handlers.iter().for_each(|h| h.on_connected());
    }

    fn on_ready(&self, session_id: &str, payload: &Value) {
        self.handlers.iter().for_each(|h| h.on_ready(session_id, payload));
    }

    fn on_resumed(&self) {
        self.handlers.iter().for_each(|h| h.on_resumed());
    }

    fn on_unhandled_event(&self, name: &str, payload: &Value) {
        self.handlers.iter().for_each(|h| h.on_unhandled_event(name, payload));
    }

    fn on_voice_server_assigned(&self, voice: &VoiceServerAssigned) {
        self.handlers.iter().for_each(|h| h.on_voice_server_assigned(voice));
    }

    fn on_disconnected(&self) {
        self.handlers.iter().for_each(|h| h.on_disconnected());
    }

    fn on_fatal_error(&self, error: &GatewayError) {
        self.handlers.iter().for_each(|h| h.on_fatal_error(error));
    }
}
