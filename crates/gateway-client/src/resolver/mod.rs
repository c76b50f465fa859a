//! Gateway URL resolution
//!
//! The engine asks a resolver for the socket endpoint before every connection attempt.

mod fixed;
mod http;

pub use fixed::StaticUrlResolver;
pub use http::HttpUrlResolver;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Resolver error type
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The REST request could not be sent or completed
    #[error("Gateway lookup failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The REST API answered with a non-success status
    #[error("Gateway lookup returned HTTP {0}")]
    Status(u16),

    /// The resolved URL is unusable
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),
}

/// Endpoint returned by a resolver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayInfo {
    /// Base WebSocket URL, without protocol query parameters
    pub url: String,
    /// Recommended shard count, when the source provides one
    #[serde(default)]
    pub shards: Option<u32>,
}

impl GatewayInfo {
    /// Create info for a bare URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shards: None,
        }
    }

    /// Connection URL with the encoding and protocol version appended
    #[must_use]
    pub fn connection_url(&self, version: u8) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}encoding=json&v={version}", self.url)
    }
}

/// Source of the gateway endpoint
#[async_trait]
pub trait GatewayUrlResolver: Send + Sync {
    /// Resolve the endpoint; implementations may serve a cached value
    async fn resolve(&self) -> Result<GatewayInfo, ResolveError>;

    /// Drop any cached value so the next `resolve` asks the source again
    fn invalidate(&self) {}
}
