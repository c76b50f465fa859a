//! Engine configuration

use crate::protocol::IdentifyPayload;
use crate::transport::{TransportConfig, DEFAULT_FRAGMENT_SIZE};
use gateway_common::{GatewayConfig, ShardConfig};
use std::time::Duration;

/// Default gateway protocol version
pub const DEFAULT_VERSION: u8 = 6;

/// Default fixed delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Missed-ACK window, in heartbeat intervals
pub const DEFAULT_HEARTBEAT_TIMEOUT_FACTOR: u32 = 5;

/// Default time `connect` waits for READY
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shard assignment sent in Identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sharding {
    /// No shard field
    #[default]
    None,
    /// Fixed `[shard_id, shard_count]`
    Fixed(ShardConfig),
    /// Use `shard_id` with the shard count recommended by the resolver
    Recommended { shard_id: u32 },
}

impl Sharding {
    /// Shard pair to send, given the resolver's recommendation
    #[must_use]
    pub fn resolve(self, recommended: Option<u32>) -> Option<[u32; 2]> {
        match self {
            Self::None => None,
            Self::Fixed(shard) => Some([shard.shard_id, shard.shard_count]),
            Self::Recommended { shard_id } => {
                let count = recommended.unwrap_or(1).max(shard_id + 1);
                Some([shard_id, count])
            }
        }
    }
}

/// Protocol engine configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub version: u8,
    pub large_threshold: u32,
    pub reconnect_delay: Duration,
    pub heartbeat_timeout_factor: u32,
    pub handshake_timeout: Duration,
    /// `None` retries until manually disconnected
    pub max_reconnect_attempts: Option<u32>,
    pub sharding: Sharding,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            large_threshold: IdentifyPayload::DEFAULT_LARGE_THRESHOLD,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_timeout_factor: DEFAULT_HEARTBEAT_TIMEOUT_FACTOR,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_reconnect_attempts: None,
            sharding: Sharding::None,
            transport: TransportConfig {
                fragment_size: DEFAULT_FRAGMENT_SIZE,
                ..TransportConfig::default()
            },
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the missed-ACK window as a multiple of the heartbeat interval (at least 1)
    #[must_use]
    pub fn with_heartbeat_timeout_factor(mut self, factor: u32) -> Self {
        self.heartbeat_timeout_factor = factor.max(1);
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_sharding(mut self, sharding: Sharding) -> Self {
        self.sharding = sharding;
        self
    }

    /// Largest frame body written unfragmented (at least 1 byte)
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.transport.fragment_size = size.max(1);
        self
    }

    /// Time without an ACK after which the connection is considered dead
    #[must_use]
    pub fn heartbeat_timeout(&self, interval: Duration) -> Duration {
        interval * self.heartbeat_timeout_factor
    }
}

impl From<&GatewayConfig> for ClientConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            version: config.version,
            large_threshold: config.large_threshold,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            sharding: config.shard.map_or(Sharding::None, Sharding::Fixed),
            ..Self::default()
        }
    }
}
