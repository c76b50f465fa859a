//! Integration test utilities for the gateway client
//!
//! Provides an in-process mock gateway server and fixtures for driving the
//! client end to end over real sockets.

pub mod fixtures;

pub use fixtures::*;
pub use helpers::*;
