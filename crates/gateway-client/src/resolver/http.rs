//! REST-backed resolver
//!
//! `GET {api}/gateway`, or `GET {api}/gateway/bot` when a bot token is supplied
//! (that variant also reports a recommended shard count).

use super::{GatewayInfo, GatewayUrlResolver, ResolveError};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Resolver that asks the REST API and caches the first successful answer
pub struct HttpUrlResolver {
    http: Client,
    api_url: String,
    bot_token: Option<String>,
    cached: Mutex<Option<GatewayInfo>>,
}

impl HttpUrlResolver {
    /// Create a resolver for the given API base URL
    pub fn new(api_url: &str) -> Result<Self, ResolveError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: None,
            cached: Mutex::new(None),
        })
    }

    /// Use the authenticated endpoint, which also returns a shard count
    #[must_use]
    pub fn with_bot_token(mut self, token: impl Into<String>) -> Self {
        self.bot_token = Some(token.into());
        self
    }

    fn endpoint(&self) -> String {
        match self.bot_token {
            Some(_) => format!("{}/gateway/bot", self.api_url),
            None => format!("{}/gateway", self.api_url),
        }
    }

    async fn fetch(&self) -> Result<GatewayInfo, ResolveError> {
        let mut request = self.http.get(self.endpoint());
        if let Some(token) = &self.bot_token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Bot {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        let info: GatewayInfo = response.json().await?;
        if info.url.is_empty() {
            return Err(ResolveError::InvalidUrl("empty URL in gateway response".to_string()));
        }
        Ok(info)
    }
}

impl std::fmt::Debug for HttpUrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUrlResolver")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.bot_token.is_some())
            .finish()
    }
}

#[async_trait]
impl GatewayUrlResolver for HttpUrlResolver {
    async fn resolve(&self) -> Result<GatewayInfo, ResolveError> {
        if let Some(info) = self.cached.lock().clone() {
            return Ok(info);
        }

        let info = self.fetch().await?;
        tracing::debug!(url = %info.url, shards = ?info.shards, "Resolved gateway URL");
        *self.cached.lock() = Some(info.clone());
        Ok(info)
    }

    fn invalidate(&self) {
        self.cached.lock().take();
    }
}
