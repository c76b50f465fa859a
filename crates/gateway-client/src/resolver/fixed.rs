//! Fixed URL resolver

use super::{GatewayInfo, GatewayUrlResolver, ResolveError};
use async_trait::async_trait;

/// Resolver that always returns the same endpoint
#[derive(Debug, Clone)]
pub struct StaticUrlResolver {
    info: GatewayInfo,
}

impl StaticUrlResolver {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            info: GatewayInfo::new(url),
        }
    }

    /// Report a recommended shard count alongside the URL
    #[must_use]
    pub fn with_shards(mut self, shards: u32) -> Self {
        self.info.shards = Some(shards);
        self
    }
}

#[async_trait]
impl GatewayUrlResolver for StaticUrlResolver {
    async fn resolve(&self) -> Result<GatewayInfo, ResolveError> {
        if self.info.url.is_empty() {
            return Err(ResolveError::InvalidUrl("empty URL".to_string()));
        }
        Ok(self.info.clone())
    }
}
