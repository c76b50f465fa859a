//! Session state
//!
//! The mutable record behind one logical gateway session.

use std::time::Duration;
use tokio::time::Instant;

/// Session record owned by the engine
///
/// `session_id` and `sequence` survive a resume attempt; a fresh Identify
/// starts from a cleared record.
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: Option<String>,
    sequence: u64,
    heartbeat_interval_ms: u32,
    last_heartbeat_ack_at: Instant,
}

impl SessionState {
    /// Create an empty session record
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: None,
            sequence: 0,
            heartbeat_interval_ms: 0,
            last_heartbeat_ack_at: Instant::now(),
        }
    }

    /// Session ID assigned by READY
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last seen dispatch sequence
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Heartbeat interval, once Hello has been received
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(u64::from(self.heartbeat_interval_ms)))
    }

    /// Record the Hello interval; the ack clock starts now
    pub fn record_hello(&mut self, interval_ms: u32) {
        self.heartbeat_interval_ms = interval_ms;
        self.last_heartbeat_ack_at = Instant::now();
    }

    /// Record a dispatch sequence number
    ///
    /// Returns `false` and keeps the stored value if `sequence` is older than it.
    pub fn record_sequence(&mut self, sequence: u64) -> bool {
        if sequence < self.sequence {
            return false;
        }
        self.sequence = sequence;
        true
    }

    /// Record the session assigned by READY
    ///
    /// READY opens a new session, so its sequence replaces the stored one
    /// even when it is lower.
    pub fn record_ready(&mut self, session_id: String, sequence: u64) {
        self.session_id = Some(session_id);
        self.sequence = sequence;
    }

    /// Record a heartbeat acknowledgement
    pub fn record_ack(&mut self) {
        self.last_heartbeat_ack_at = Instant::now();
    }

    /// Time since the last acknowledgement (or since Hello)
    pub fn since_last_ack(&self) -> Duration {
        self.last_heartbeat_ack_at.elapsed()
    }

    /// Session ID and sequence to resume from, if a session was established
    pub fn resume_point(&self) -> Option<(String, u64)> {
        self.session_id
            .as_ref()
            .map(|id| (id.clone(), self.sequence))
    }

    /// Forget the session so the next handshake is a fresh Identify
    pub fn clear_session(&mut self) {
        self.session_id = None;
        self.sequence = 0;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
