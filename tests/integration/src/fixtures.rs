//! Test fixtures
//!
//! Reusable configuration, handshake and event helpers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gateway_client::protocol::{OpCode, Payload};
use gateway_client::{ChannelEventHandler, ClientConfig, GatewayClient, GatewayEvent};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use crate::helpers::{MockGateway, MockSession, WAIT};

/// Token the tests authenticate with
pub const TOKEN: &str = "T";

/// Session ID the mock assigns in READY
pub const SESSION_ID: &str = "xyz";

/// Heartbeat interval long enough to stay out of the way
pub const QUIET_INTERVAL_MS: u64 = 41_250;

/// Client configuration with a short reconnect delay
pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_reconnect_delay(Duration::from_millis(50))
        .with_handshake_timeout(Duration::from_secs(5))
}

/// Route client logs to the test output; safe to call from every test
pub fn init_logging() {
    let _ = gateway_common::try_init_tracing();
}

/// Build a client for `gateway` whose events land in the returned channel
pub fn client_for(
    gateway: &MockGateway,
    config: ClientConfig,
) -> (GatewayClient, UnboundedReceiver<GatewayEvent>) {
    init_logging();
    let (handler, events) = ChannelEventHandler::new();
    let client = GatewayClient::builder(gateway.resolver())
        .config(config)
        .handler(Arc::new(handler))
        .build();
    (client, events)
}

/// READY dispatch body
pub fn ready_body(session_id: &str) -> serde_json::Value {
    json!({
        "v": 6,
        "session_id": session_id,
        "user": { "id": "1", "username": "tester" },
        "guilds": [],
    })
}

/// Connect `client` and complete Hello, Identify and READY (s=1) on the server side
///
/// Returns the server session and the Identify payload the client sent.
pub async fn connect_ready(
    client: &GatewayClient,
    gateway: &mut MockGateway,
    heartbeat_interval_ms: u64,
) -> Result<(MockSession, Payload)> {
    let server = async {
        let mut session = gateway.accept().await?;
        session.send(&Payload::hello(heartbeat_interval_ms)).await?;
        let identify = session.recv_op(OpCode::Identify).await?;
        session
            .send(&Payload::dispatch("READY", 1, ready_body(SESSION_ID)))
            .await?;
        Ok::<_, anyhow::Error>((session, identify))
    };

    let (connected, served) = tokio::join!(client.connect(TOKEN), server);
    let served = served?;
    connected.context("client failed to connect")?;
    Ok(served)
}

/// Next event from the client
pub async fn next_event(events: &mut UnboundedReceiver<GatewayEvent>) -> Result<GatewayEvent> {
    timeout(WAIT, events.recv())
        .await
        .context("timed out waiting for a client event")?
        .context("event channel closed")
}

/// Skip events until one matches `predicate`
pub async fn wait_for_event<F>(
    events: &mut UnboundedReceiver<GatewayEvent>,
    predicate: F,
) -> Result<GatewayEvent>
where
    F: Fn(&GatewayEvent) -> bool,
{
    loop {
        let event = next_event(events).await?;
        if predicate(&event) {
            return Ok(event);
        }
    }
}

/// Everything already queued, without waiting
pub fn drain_events(events: &mut UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}
