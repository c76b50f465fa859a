//! Connection state
//!
//! Lifecycle status and the per-session record shared by the engine's loops.

mod session;
mod status;

pub use session::SessionState;
pub use status::ConnectionStatus;
