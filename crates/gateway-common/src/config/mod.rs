//! Configuration structs

mod gateway_config;

pub use gateway_config::{ConfigError, Environment, GatewayConfig, ShardConfig};
