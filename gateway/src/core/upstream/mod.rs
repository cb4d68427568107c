//! Upstream streaming conversational API.
//!
//! A session opens one upstream link, forwards encoded audio through it and
//! consumes a lazy sequence of decoded events: setup acknowledgements, model
//! text, structured function calls and a terminal close.
//!
//! # Architecture
//!
//! - [`UpstreamConnector`] opens links; one connector is shared by all sessions
//! - [`UpstreamLink`] is the per-session handle; [`UpstreamPeer`] is its
//!   transport side
//! - [`gemini`] is the production transport

mod base;
pub mod gemini;

pub use base::{
    ConnectError, ConnectResult, LINK_CHANNEL_CAPACITY, PeerEvents, SendError, UpstreamConnector,
    UpstreamEvent, UpstreamEvents, UpstreamFrame, UpstreamLink, UpstreamPeer,
};
pub use gemini::{GeminiConfig, GeminiConnector};
