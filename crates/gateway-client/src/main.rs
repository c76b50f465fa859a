//! Gateway client demo
//!
//! Run with:
//! ```bash
//! GATEWAY_TOKEN=... cargo run -p gateway-client
//! ```
//!
//! Connects, logs every event until Ctrl-C, then disconnects.

use anyhow::Context;
use gateway_client::{
    ChannelEventHandler, ClientConfig, GatewayClient, GatewayEvent, GatewayUrlResolver,
    HttpUrlResolver, StaticUrlResolver,
};
use gateway_common::{try_init_tracing_with_config, GatewayConfig, TracingConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway client failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.env,
        version = config.version,
        shard = ?config.shard,
        "Configuration loaded"
    );

    let resolver: Arc<dyn GatewayUrlResolver> = match &config.gateway_url {
        Some(url) => Arc::new(StaticUrlResolver::new(url.clone())),
        None => Arc::new(
            HttpUrlResolver::new(&config.api_url)
                .context("Failed to build HTTP client")?
                .with_bot_token(config.token.clone()),
        ),
    };

    let (handler, mut events) = ChannelEventHandler::new();
    let client = GatewayClient::builder(resolver)
        .config(ClientConfig::from(&config))
        .handler(Arc::new(handler))
        .build();

    client
        .connect(config.token.clone())
        .await
        .context("Failed to connect to the gateway")?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Some(GatewayEvent::Dispatch { name, payload }) => {
                    info!(event = %name, size = payload.to_string().len(), "Dispatch");
                }
                Some(GatewayEvent::Fatal(reason)) => {
                    warn!(reason = %reason, "Gateway session ended");
                    break;
                }
                Some(event) => info!(event = event.kind(), "Gateway event"),
                None => break,
            },
        }
    }

    client.disconnect().await;
    info!("Disconnected");

    Ok(())
}
