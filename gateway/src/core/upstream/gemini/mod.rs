//! Gemini Live API transport.
//!
//! Implements [`UpstreamConnector`](crate::core::upstream::UpstreamConnector)
//! over the Gemini bidirectional streaming WebSocket. The setup frame declares
//! a fixed system instruction and a single function, `update_shopping_list`,
//! which the model calls with the complete current list.

mod client;
mod config;
mod messages;

pub use client::GeminiConnector;
pub use config::{
    AUDIO_MIME_TYPE, DEFAULT_GEMINI_MODEL, DEFAULT_SYSTEM_INSTRUCTION,
    EXTRACTION_FUNCTION_DESCRIPTION, EXTRACTION_FUNCTION_NAME, GEMINI_LIVE_URL, GeminiConfig,
};
pub use messages::{
    ClientMessage, ServerMessage, decode_server_message, extraction_parameters_schema,
};
