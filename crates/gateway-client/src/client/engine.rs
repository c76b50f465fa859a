//! Session supervisor
//!
//! Runs connection attempts back to back: resolve, open, handshake, then route
//! payloads until the attempt ends. How it ended decides what happens next.

use super::heartbeat::{heartbeat_loop, HeartbeatExit};
use super::{GatewayError, GatewayResult, Inner};
use crate::connection::ConnectionStatus;
use crate::events::{InternalEvent, VoiceServerAssigned};
use crate::protocol::{CloseAction, CloseCode, IdentifyPayload, OpCode, Payload, ResumePayload};
use crate::transport::{FrameTransport, TransportError, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Close status used when the heartbeat ACK window lapses
const PROTOCOL_ERROR: u16 = 1002;

/// Close status that keeps the session resumable
const RESUMABLE_CLOSE: u16 = 4000;

/// How one connection attempt ended
#[derive(Debug)]
enum AttemptEnd {
    /// The run was cancelled by `disconnect`
    Cancelled,
    /// Server asked for a reconnect; go again right away
    Reconnect,
    /// Connection lost; go again after the fixed delay
    Lost(GatewayError),
    /// Retrying cannot succeed
    Fatal(GatewayError),
}

/// One open socket and the loops bound to it
struct Connection {
    transport: Arc<FrameTransport>,
    cancel: CancellationToken,
    heartbeat: Option<JoinHandle<HeartbeatExit>>,
    /// Shard count recommended by the resolver
    recommended_shards: Option<u32>,
}

struct Supervisor {
    inner: Arc<Inner>,
    token: String,
    cancel: CancellationToken,
    /// Completes `connect`; taken on the first READY or the first failure
    ready: Option<oneshot::Sender<GatewayResult<()>>>,
    failures: u32,
}

pub(super) async fn supervise(
    inner: Arc<Inner>,
    token: String,
    cancel: CancellationToken,
    ready: oneshot::Sender<GatewayResult<()>>,
) {
    Supervisor {
        inner,
        token,
        cancel,
        ready: Some(ready),
        failures: 0,
    }
    .run()
    .await;
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            let error = match self.attempt().await {
                AttemptEnd::Cancelled => break,
                AttemptEnd::Reconnect => {
                    tracing::info!("Reconnecting at server request");
                    self.inner.set_status(ConnectionStatus::Reconnecting);
                    continue;
                }
                AttemptEnd::Fatal(error) => {
                    self.fail(error);
                    break;
                }
                AttemptEnd::Lost(error) => error,
            };

            // Nothing is retried until the first READY
            if let Some(ready) = self.ready.take() {
                tracing::warn!(error = %error, "Gateway handshake failed");
                self.inner.set_status(ConnectionStatus::Disconnected);
                let _ = ready.send(Err(error));
                break;
            }

            self.failures += 1;
            if let Some(max) = self.inner.config.max_reconnect_attempts {
                if self.failures > max {
                    tracing::warn!(error = %error, "Last reconnect attempt failed");
                    self.fail(GatewayError::ReconnectExhausted(max));
                    break;
                }
            }

            let delay = self.inner.config.reconnect_delay;
            tracing::warn!(
                error = %error,
                attempt = self.failures,
                delay_ms = delay.as_millis() as u64,
                "Connection lost, reconnecting"
            );
            self.inner.set_status(ConnectionStatus::Reconnecting);

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!("Supervisor exited");
    }

    /// Enter FatallyClosed and report `error` exactly once
    fn fail(&mut self, error: GatewayError) {
        self.inner.set_status(ConnectionStatus::FatallyClosed);
        match self.ready.take() {
            Some(ready) => {
                tracing::error!(error = %error, "Gateway rejected the connection");
                let _ = ready.send(Err(error));
            }
            None => {
                tracing::error!(error = %error, "Gateway session closed fatally");
                self.inner.handler.on_fatal_error(&error);
            }
        }
    }

    async fn attempt(&mut self) -> AttemptEnd {
        let info = tokio::select! {
            () = self.cancel.cancelled() => return AttemptEnd::Cancelled,
            result = self.inner.resolver.resolve() => match result {
                Ok(info) => info,
                Err(e) => return AttemptEnd::Lost(e.into()),
            },
        };
        let url = info.connection_url(self.inner.config.version);
        tracing::debug!(url = %url, "Opening gateway connection");

        let opened = tokio::select! {
            () = self.cancel.cancelled() => return AttemptEnd::Cancelled,
            result = FrameTransport::connect(&url, self.inner.config.transport.clone()) => result,
        };
        let (transport, mut events) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                // The endpoint may have moved
                self.inner.resolver.invalidate();
                return AttemptEnd::Lost(e.into());
            }
        };

        let transport = Arc::new(transport);
        *self.inner.link.lock() = Some(transport.clone());
        if self.inner.status() == ConnectionStatus::Connecting {
            self.inner.set_status(ConnectionStatus::AwaitingHello);
        }

        let mut connection = Connection {
            transport,
            cancel: self.cancel.child_token(),
            heartbeat: None,
            recommended_shards: info.shards,
        };

        let end = self.drive(&mut connection, &mut events).await;

        // Nothing from this attempt may touch the next one
        connection.cancel.cancel();
        self.inner.link.lock().take();
        if let Some(heartbeat) = connection.heartbeat.take() {
            let _ = heartbeat.await;
        }

        match &end {
            AttemptEnd::Cancelled => connection.transport.shutdown().await,
            AttemptEnd::Reconnect | AttemptEnd::Lost(_) | AttemptEnd::Fatal(_) => {
                if !matches!(end, AttemptEnd::Fatal(_)) {
                    connection.transport.close(RESUMABLE_CLOSE, "Reconnecting");
                }
                // A peer that never answers the close must not delay the retry
                let transport = connection.transport;
                tokio::spawn(
                    async move { transport.shutdown().await }.instrument(tracing::Span::current()),
                );
            }
        }

        end
    }

    async fn drive(
        &mut self,
        connection: &mut Connection,
        events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> AttemptEnd {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return AttemptEnd::Cancelled,
                exit = heartbeat_exit(&mut connection.heartbeat) => {
                    connection.heartbeat = None;
                    if exit == HeartbeatExit::TimedOut {
                        connection.transport.close(PROTOCOL_ERROR, "Heartbeat ACK timeout");
                        return AttemptEnd::Lost(GatewayError::HeartbeatTimeout);
                    }
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Message(payload)) => {
                        if let Some(end) = self.handle_payload(connection, payload) {
                            return end;
                        }
                    }
                    Some(TransportEvent::Fatal(error)) => return self.classify(error),
                    None => return AttemptEnd::Lost(TransportError::ConnectionLost.into()),
                },
            }
        }
    }

    fn handle_payload(&mut self, connection: &mut Connection, payload: Payload) -> Option<AttemptEnd> {
        match payload.op {
            OpCode::Hello => self.on_hello(connection, &payload),
            OpCode::Dispatch => {
                self.on_dispatch(payload);
                None
            }
            OpCode::HeartbeatAck => {
                self.inner.session.lock().record_ack();
                tracing::trace!("Heartbeat ACK received");
                None
            }
            OpCode::Heartbeat => {
                let sequence = self.inner.session.lock().sequence();
                tracing::debug!(seq = sequence, "Server requested a heartbeat");
                send(connection, Ok(Payload::heartbeat(sequence))).err()
            }
            OpCode::Reconnect => Some(AttemptEnd::Reconnect),
            OpCode::InvalidSession => {
                tracing::warn!(resumable = %payload.d, "Session invalidated, identifying afresh");
                self.inner.session.lock().clear_session();
                self.identify(connection).err()
            }
            op => {
                tracing::debug!(op = %op, "Ignoring unexpected opcode");
                None
            }
        }
    }

    fn on_hello(&mut self, connection: &mut Connection, payload: &Payload) -> Option<AttemptEnd> {
        let Some(hello) = payload.as_hello() else {
            return Some(AttemptEnd::Lost(GatewayError::Protocol(
                "malformed Hello".to_string(),
            )));
        };
        if hello.heartbeat_interval == 0 {
            return Some(AttemptEnd::Lost(GatewayError::Protocol(
                "Hello with zero heartbeat interval".to_string(),
            )));
        }

        let interval_ms = u32::try_from(hello.heartbeat_interval).unwrap_or(u32::MAX);
        self.inner.session.lock().record_hello(interval_ms);
        let interval = Duration::from_millis(u64::from(interval_ms));

        tracing::debug!(heartbeat_interval_ms = interval_ms, "Hello received");

        let heartbeat = tokio::spawn(
            heartbeat_loop(
                self.inner.clone(),
                connection.transport.clone(),
                interval,
                connection.cancel.clone(),
            )
            .instrument(tracing::Span::current()),
        );
        if let Some(previous) = connection.heartbeat.replace(heartbeat) {
            previous.abort();
        }

        let resume_point = self.inner.session.lock().resume_point();
        match resume_point {
            Some((session_id, seq)) => {
                tracing::info!(session_id = %session_id, seq = seq, "Resuming session");
                self.inner.set_status(ConnectionStatus::Reconnecting);
                let body = ResumePayload {
                    token: self.token.clone(),
                    session_id,
                    seq,
                };
                send(connection, Payload::resume(&body)).err()
            }
            None => self.identify(connection).err(),
        }
    }

    fn identify(&self, connection: &Connection) -> Result<(), AttemptEnd> {
        let mut body = IdentifyPayload::new(self.token.clone())
            .with_large_threshold(self.inner.config.large_threshold);
        if let Some([shard_id, shard_count]) =
            self.inner.config.sharding.resolve(connection.recommended_shards)
        {
            body = body.with_shard(shard_id, shard_count);
        }

        tracing::debug!(shard = ?body.shard, "Sending Identify");
        self.inner.set_status(ConnectionStatus::Identifying);
        send(connection, Payload::identify(&body))
    }

    fn on_dispatch(&mut self, payload: Payload) {
        let Some(name) = payload.t.as_deref() else {
            tracing::warn!("Dropping dispatch without an event name");
            return;
        };

        let event = InternalEvent::from_name(name);

        // READY starts a new session and sets the counter itself
        if let Some(seq) = payload.s.filter(|_| event != Some(InternalEvent::Ready)) {
            let mut session = self.inner.session.lock();
            if !session.record_sequence(seq) {
                tracing::warn!(seq = seq, last = session.sequence(), "Sequence went backwards");
            }
        }

        match event {
            Some(InternalEvent::Ready) => {
                let Some(ready) = payload.as_ready() else {
                    tracing::warn!("READY without a session ID");
                    return;
                };
                tracing::info!(session_id = %ready.session_id, version = ?ready.version, "Session ready");
                self.inner
                    .session
                    .lock()
                    .record_ready(ready.session_id.clone(), payload.s.unwrap_or(0));
                self.inner.set_status(ConnectionStatus::Connected);
                self.inner.handler.on_ready(&ready.session_id, &payload.d);
                self.established();
            }
            Some(InternalEvent::Resumed) => {
                tracing::info!("Session resumed");
                self.inner.set_status(ConnectionStatus::Connected);
                self.inner.handler.on_resumed();
                self.established();
            }
            Some(InternalEvent::VoiceServerUpdate) => self.on_voice_server_update(&payload),
            None => self.inner.handler.on_unhandled_event(name, &payload.d),
        }
    }

    fn on_voice_server_update(&self, payload: &Payload) {
        let Some(update) = payload.as_voice_server_update() else {
            tracing::warn!("Malformed VOICE_SERVER_UPDATE");
            return;
        };
        let Some(endpoint) = update.endpoint else {
            tracing::debug!(guild_id = %update.guild_id, "Voice server not allocated yet");
            return;
        };

        tracing::debug!(guild_id = %update.guild_id, endpoint = %endpoint, "Voice server assigned");
        let voice = VoiceServerAssigned {
            guild_id: update.guild_id,
            endpoint,
            token: update.token,
            session_id: self.inner.session.lock().session_id().map(str::to_string),
        };
        self.inner.handler.on_voice_server_assigned(&voice);
    }

    /// READY or RESUMED: the session is live again
    fn established(&mut self) {
        self.failures = 0;
        self.inner.handler.on_connected();
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        }
    }

    /// Decide what a transport failure means for the session
    fn classify(&self, error: TransportError) -> AttemptEnd {
        if let TransportError::RemoteClosed { code, reason } = &error {
            match (CloseCode::from_u16(*code), CloseAction::for_status(*code)) {
                (Some(close), CloseAction::Stop) => {
                    return AttemptEnd::Fatal(GatewayError::Closed {
                        code: close,
                        reason: reason.clone(),
                    });
                }
                (_, CloseAction::Identify) => {
                    tracing::info!(code = *code, "Session cannot be resumed");
                    self.inner.session.lock().clear_session();
                }
                _ => {}
            }
        }
        AttemptEnd::Lost(error.into())
    }
}

/// Queue a payload, mapping failures to the end of the attempt
fn send(connection: &Connection, payload: Result<Payload, serde_json::Error>) -> Result<(), AttemptEnd> {
    let payload = payload.map_err(|e| AttemptEnd::Fatal(e.into()))?;
    connection
        .transport
        .send_payload(&payload)
        .map_err(|e| AttemptEnd::Lost(e.into()))
}

/// Resolves when the heartbeat loop exits; pending while none is running
async fn heartbeat_exit(heartbeat: &mut Option<JoinHandle<HeartbeatExit>>) -> HeartbeatExit {
    match heartbeat {
        Some(handle) => handle.await.unwrap_or(HeartbeatExit::Stopped),
        None => std::future::pending().await,
    }
}
