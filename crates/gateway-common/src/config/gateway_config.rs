//! Gateway client configuration
//!
//! Loads configuration from environment variables and an optional `.env` file.

use serde::Deserialize;
use std::env;

/// Gateway client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Deployment environment, used to pick the tracing profile
    #[serde(default)]
    pub env: Environment,
    /// Authentication token sent in Identify and Resume
    pub token: String,
    /// REST API base used to resolve the gateway endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Fixed gateway endpoint; skips REST resolution when set
    #[serde(default)]
    pub gateway_url: Option<String>,
    /// Gateway protocol version appended as `v=`
    #[serde(default = "default_version")]
    pub version: u8,
    /// Member count above which a guild is considered large
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    /// Fixed delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Reconnect attempt cap; `None` retries until manually disconnected
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
    /// How long `connect` waits for READY
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Optional shard assignment
    #[serde(default)]
    pub shard: Option<ShardConfig>,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Shard assignment sent in Identify as `[shard_id, shard_count]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ShardConfig {
    pub shard_id: u32,
    pub shard_count: u32,
}

// Default value functions
fn default_api_url() -> String {
    "https://discordapp.com/api".to_string()
}

fn default_version() -> u8 {
    6
}

fn default_large_threshold() -> u32 {
    250
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `GATEWAY_TOKEN` is missing or a numeric variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let shard = match (
            parse_var::<u32, _>(&lookup, "GATEWAY_SHARD_ID")?,
            parse_var::<u32, _>(&lookup, "GATEWAY_SHARD_COUNT")?,
        ) {
            (Some(shard_id), Some(shard_count)) => {
                if shard_id >= shard_count {
                    return Err(ConfigError::InvalidValue(
                        "GATEWAY_SHARD_ID",
                        format!("{shard_id} is not below shard count {shard_count}"),
                    ));
                }
                Some(ShardConfig {
                    shard_id,
                    shard_count,
                })
            }
            (None, None) => None,
            _ => return Err(ConfigError::MissingVar("GATEWAY_SHARD_COUNT")),
        };

        Ok(Self {
            env: lookup("APP_ENV")
                .as_deref()
                .and_then(Environment::parse)
                .unwrap_or_default(),
            token: lookup("GATEWAY_TOKEN")
                .filter(|s| !s.is_empty())
                .ok_or(ConfigError::MissingVar("GATEWAY_TOKEN"))?,
            api_url: lookup("GATEWAY_API_URL").unwrap_or_else(default_api_url),
            gateway_url: lookup("GATEWAY_URL").filter(|s| !s.is_empty()),
            version: parse_var(&lookup, "GATEWAY_VERSION")?.unwrap_or_else(default_version),
            large_threshold: parse_var(&lookup, "GATEWAY_LARGE_THRESHOLD")?
                .unwrap_or_else(default_large_threshold),
            reconnect_delay_ms: parse_var(&lookup, "GATEWAY_RECONNECT_DELAY_MS")?
                .unwrap_or_else(default_reconnect_delay_ms),
            max_reconnect_attempts: parse_var(&lookup, "GATEWAY_MAX_RECONNECT_ATTEMPTS")?,
            handshake_timeout_ms: parse_var(&lookup, "GATEWAY_HANDSHAKE_TIMEOUT_MS")?
                .unwrap_or_else(default_handshake_timeout_ms),
            shard,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
