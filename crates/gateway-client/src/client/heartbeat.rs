//! Heartbeat loop
//!
//! One loop per socket, started on Hello and stopped with the connection's token.

use super::Inner;
use crate::protocol::Payload;
use crate::transport::FrameTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why the heartbeat loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeartbeatExit {
    /// Cancelled, or the transport stopped accepting frames
    Stopped,
    /// No ACK within the timeout window
    TimedOut,
}

/// Send `{"op":1,"d":seq}` every `interval` until cancelled or the ACK window lapses
pub(super) async fn heartbeat_loop(
    inner: Arc<Inner>,
    transport: Arc<FrameTransport>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatExit {
    let timeout = inner.config.heartbeat_timeout(interval);
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(interval_ms = interval.as_millis() as u64, "Heartbeat loop started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatExit::Stopped,
            _ = ticker.tick() => {}
        }

        let (sequence, since_ack) = {
            let session = inner.session.lock();
            (session.sequence(), session.since_last_ack())
        };

        if since_ack >= timeout {
            tracing::warn!(
                since_ack_ms = since_ack.as_millis() as u64,
                timeout_ms = timeout.as_millis() as u64,
                "Connection zombied (heartbeat not ACKed)"
            );
            return HeartbeatExit::TimedOut;
        }

        if let Err(e) = transport.send_payload(&Payload::heartbeat(sequence)) {
            tracing::debug!(error = %e, "Heartbeat not queued, stopping");
            return HeartbeatExit::Stopped;
        }
        tracing::trace!(seq = sequence, "Heartbeat sent");
    }
}
