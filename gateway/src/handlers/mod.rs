//! HTTP and WebSocket request handlers
//!
//! - `api` - Service banner and health check
//! - `relay` - Client WebSocket session relay
//! - `sessions` - Administrative session listing and termination

pub mod api;
pub mod relay;
pub mod sessions;

pub use relay::relay_handler;
