//! Gemini Live API configuration types.
//!
//! This module contains the endpoint, the default model, the fixed system
//! instruction and the name of the list-extraction function declared during
//! the handshake.

use std::fmt;

use url::Url;
use zeroize::Zeroize;

use crate::core::upstream::base::ConnectError;

/// Gemini Live API WebSocket endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model used for the live session.
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-exp";

/// MIME type declared for forwarded audio chunks.
pub const AUDIO_MIME_TYPE: &str = "audio/pcm";

/// Name of the function the model calls to report the full current list.
pub const EXTRACTION_FUNCTION_NAME: &str = "update_shopping_list";

/// Description attached to the extraction function declaration.
pub const EXTRACTION_FUNCTION_DESCRIPTION: &str =
    "Update the entire shopping list based on the conversation";

/// System instruction sent with every handshake unless overridden.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"You are a shopping assistant. Listen to the user's speech and manage the complete shopping list.

IMPORTANT: Always return the ENTIRE current shopping list, never only the changes.

Examples:
- User: "Add milk" -> Return: [{name: "milk", quantity: 1}]
- User: "Add more milk" -> Return: [{name: "milk", quantity: 2}]
- User: "Add an onion" -> Return: [{name: "milk", quantity: 2}, {name: "onion", quantity: 1}]
- User: "Remove the milk" -> Return: [{name: "onion", quantity: 1}]
- User: "Actually 3 onions" -> Return: [{name: "onion", quantity: 3}]

Follow the context of the conversation and always operate on the whole list."#;

/// Connection settings for the Gemini Live API.
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key, sent as the `key` query parameter
    pub api_key: String,
    /// WebSocket endpoint
    pub url: String,
    /// Model name declared in the setup frame
    pub model: String,
    /// System instruction declared in the setup frame
    pub system_instruction: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl GeminiConfig {
    /// Create a config with defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: GEMINI_LIVE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }

    /// Build the WebSocket URL with the key query parameter.
    pub fn ws_url(&self) -> Result<Url, ConnectError> {
        let mut url =
            Url::parse(&self.url).map_err(|e| ConnectError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Drop for GeminiConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
