//! Protocol engine
//!
//! [`GatewayClient`] drives one logical gateway session: handshake, heartbeating,
//! resume and reconnect, and dispatch fan-out to a [`GatewayEventHandler`].
//!
//! Each connection attempt gets a fresh transport, heartbeat loop and child
//! cancellation token. The previous attempt's heartbeat is joined before the
//! next one starts; its socket finishes closing in the background.

mod config;
mod engine;
mod error;
mod heartbeat;

pub use config::{
    ClientConfig, Sharding, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_TIMEOUT_FACTOR,
    DEFAULT_RECONNECT_DELAY, DEFAULT_VERSION,
};
pub use error::{GatewayError, GatewayResult};

use crate::connection::{ConnectionStatus, SessionState};
use crate::events::{GatewayEventHandler, NoopHandler};
use crate::protocol::{
    Payload, RequestGuildMembersPayload, StatusUpdatePayload, VoiceStateUpdatePayload,
};
use crate::resolver::GatewayUrlResolver;
use crate::transport::FrameTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// State shared between the handle, the supervisor and the heartbeat loop
struct Inner {
    config: ClientConfig,
    resolver: Arc<dyn GatewayUrlResolver>,
    handler: Arc<dyn GatewayEventHandler>,
    span: Span,
    status: watch::Sender<ConnectionStatus>,
    session: Mutex<SessionState>,
    /// Transport of the current attempt, for caller commands
    link: Mutex<Option<Arc<FrameTransport>>>,
    run: Mutex<Option<Run>>,
}

impl Inner {
    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "Status changed");
        }
    }
}

/// A running supervisor and the token that stops it
struct Run {
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

impl Run {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.supervisor.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Gateway supervisor panicked");
            }
        }
    }
}

/// Builder for [`GatewayClient`]
pub struct GatewayClientBuilder {
    config: ClientConfig,
    resolver: Arc<dyn GatewayUrlResolver>,
    handler: Arc<dyn GatewayEventHandler>,
    span: Option<Span>,
}

impl GatewayClientBuilder {
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn GatewayEventHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Span every engine task is instrumented with; defaults to `gateway`
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> GatewayClient {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        GatewayClient {
            inner: Arc::new(Inner {
                config: self.config,
                resolver: self.resolver,
                handler: self.handler,
                span: self.span.unwrap_or_else(|| tracing::info_span!("gateway")),
                status,
                session: Mutex::new(SessionState::new()),
                link: Mutex::new(None),
                run: Mutex::new(None),
            }),
        }
    }
}

/// Gateway client
///
/// Commands never wait on the engine's loops; `connect` and `disconnect` only
/// wait for the handshake and for teardown respectively.
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl GatewayClient {
    /// Start building a client that resolves its endpoint with `resolver`
    pub fn builder(resolver: Arc<dyn GatewayUrlResolver>) -> GatewayClientBuilder {
        GatewayClientBuilder {
            config: ClientConfig::default(),
            resolver,
            handler: Arc::new(NoopHandler),
            span: None,
        }
    }

    /// Create a client with the default configuration
    pub fn new(resolver: Arc<dyn GatewayUrlResolver>, handler: Arc<dyn GatewayEventHandler>) -> Self {
        Self::builder(resolver).handler(handler).build()
    }

    /// Connect and authenticate
    ///
    /// Returns once READY has been received. A failure before that point is
    /// returned here and not retried; after it, the engine reconnects on its own.
    pub async fn connect(&self, token: impl Into<String>) -> GatewayResult<()> {
        let inner = &self.inner;

        let claimed = inner.status.send_if_modified(|status| {
            if status.is_terminal() {
                *status = ConnectionStatus::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(GatewayError::AlreadyConnected);
        }

        // A run that ended fatally still holds its finished handle
        let stale = inner.run.lock().take();
        if let Some(stale) = stale {
            stale.stop().await;
        }

        *inner.session.lock() = SessionState::new();

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let supervisor = tokio::spawn(
            engine::supervise(inner.clone(), token.into(), cancel.clone(), ready_tx)
                .instrument(inner.span.clone()),
        );
        *inner.run.lock() = Some(Run { cancel, supervisor });

        tracing::info!(parent: &inner.span, "Connecting to gateway");

        match tokio::time::timeout(inner.config.handshake_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                self.reap().await;
                Err(e)
            }
            // The run was taken by `disconnect`
            Ok(Err(_)) => Err(GatewayError::Aborted),
            Err(_) => {
                tracing::warn!(
                    parent: &inner.span,
                    timeout_ms = inner.config.handshake_timeout.as_millis() as u64,
                    "Handshake timed out"
                );
                self.reap().await;
                inner.set_status(ConnectionStatus::Disconnected);
                Err(GatewayError::HandshakeTimeout(inner.config.handshake_timeout))
            }
        }
    }

    /// Stop a run that failed before READY, without reporting a disconnect
    async fn reap(&self) {
        let run = self.inner.run.lock().take();
        if let Some(run) = run {
            run.stop().await;
        }
    }

    /// Close the session and stop every loop
    ///
    /// Idempotent: only the call that actually stops a live run fires
    /// `on_disconnected`. After a fatal close the client stays FatallyClosed.
    pub async fn disconnect(&self) {
        let run = self.inner.run.lock().take();
        let Some(run) = run else {
            tracing::debug!(parent: &self.inner.span, "Disconnect requested while idle");
            return;
        };

        tracing::info!(parent: &self.inner.span, "Disconnecting from gateway");
        run.stop().await;

        if self.inner.status() == ConnectionStatus::FatallyClosed {
            tracing::debug!(parent: &self.inner.span, "Session already closed fatally");
            return;
        }

        *self.inner.session.lock() = SessionState::new();
        self.inner.set_status(ConnectionStatus::Disconnected);
        self.inner.handler.on_disconnected();
    }

    /// Current lifecycle status
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    /// Watch status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Session ID assigned by the last READY
    pub fn session_id(&self) -> Option<String> {
        self.inner.session.lock().session_id().map(str::to_string)
    }

    /// Last seen dispatch sequence
    pub fn sequence(&self) -> u64 {
        self.inner.session.lock().sequence()
    }

    /// Ask to join (or, with `channel_id = None`, leave) a voice channel
    ///
    /// One-way: the voice server arrives later through `on_voice_server_assigned`.
    pub fn send_voice_state_update(
        &self,
        guild_id: impl Into<String>,
        channel_id: Option<String>,
    ) -> GatewayResult<()> {
        self.send_voice_state(VoiceStateUpdatePayload {
            guild_id: guild_id.into(),
            channel_id,
            self_mute: false,
            self_deaf: false,
            session_id: None,
        })
    }

    /// Send a voice state update with explicit mute and deafen flags
    ///
    /// The current session ID is filled in.
    pub fn send_voice_state(&self, mut update: VoiceStateUpdatePayload) -> GatewayResult<()> {
        update.session_id = self.session_id();
        tracing::debug!(
            parent: &self.inner.span,
            guild_id = %update.guild_id,
            channel_id = ?update.channel_id,
            "Requesting voice session"
        );
        self.send_connected(&Payload::voice_state_update(&update)?)
    }

    /// Update presence (op 3)
    pub fn update_status(&self, status: &StatusUpdatePayload) -> GatewayResult<()> {
        if !status.is_valid_status() {
            return Err(GatewayError::InvalidStatus(status.status.clone()));
        }
        self.send_connected(&Payload::status_update(status)?)
    }

    /// Request guild members (op 8); members arrive as dispatches
    pub fn request_guild_members(
        &self,
        guild_id: impl Into<String>,
        query: impl Into<String>,
        limit: u32,
    ) -> GatewayResult<()> {
        let request = RequestGuildMembersPayload {
            guild_id: guild_id.into(),
            query: query.into(),
            limit,
        };
        self.send_connected(&Payload::request_guild_members(&request)?)
    }

    fn send_connected(&self, payload: &Payload) -> GatewayResult<()> {
        if !self.status().is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let link = self.inner.link.lock().clone();
        let link = link.ok_or(GatewayError::NotConnected)?;
        link.send_payload(payload)?;
        Ok(())
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        if let Some(run) = self.inner.run.lock().take() {
            run.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("status", &self.status())
            .field("session_id", &self.session_id())
            .finish()
    }
}
