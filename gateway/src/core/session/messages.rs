//! Client WebSocket message types.
//!
//! Every frame is a JSON object with a `type` field. Inbound frames whose type
//! is missing or unrecognized parse to [`ClientCommand::Unknown`] rather than
//! an error so newer clients can talk to older relays.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::extraction::ExtractedListState;

/// Status sent once the upstream acknowledged the handshake.
pub const STATUS_LISTENING: &str = "listening";

/// Status sent when the upstream connection ended.
pub const STATUS_UPSTREAM_CLOSED: &str = "upstream_closed";

/// Utterance used by `test_audio` when the client sends no text.
pub const DEFAULT_TEST_UTTERANCE: &str = "add milk to the list";

const KNOWN_TYPES: &[&str] = &[
    "audio_chunk",
    "start_session",
    "stop_session",
    "ping",
    "test_audio",
];

/// A client frame that could not be decoded.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Message must be a JSON object")]
    NotAnObject,

    #[error("Invalid message fields: {0}")]
    InvalidFields(String),

    #[error("Binary frame is not valid UTF-8")]
    InvalidUtf8,
}

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Commands a client can send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Begin a session; idempotent
    StartSession,

    /// End the session
    StopSession,

    /// Liveness check
    Ping,

    /// Encoded audio to forward upstream
    AudioChunk {
        #[serde(default)]
        audio_data: Option<String>,
        /// Echoed back verbatim in `audio_received`
        #[serde(default)]
        timestamp: Option<Value>,
    },

    /// Inject a transcript and a sample list without touching the upstream
    #[serde(rename = "test_audio")]
    SimulatedInput {
        #[serde(default)]
        text: Option<String>,
    },

    /// Missing or unrecognized `type`
    #[serde(skip)]
    Unknown(String),
}

impl ClientCommand {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

        match object.get("type").and_then(Value::as_str) {
            Some(kind) if KNOWN_TYPES.contains(&kind) => serde_json::from_value(value)
                .map_err(|e| DecodeError::InvalidFields(e.to_string())),
            kind => Ok(ClientCommand::Unknown(kind.unwrap_or_default().to_string())),
        }
    }

    /// Decode one binary frame carrying UTF-8 JSON.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(data).map_err(|_| DecodeError::InvalidUtf8)?;
        Self::parse(text)
    }

    /// Wire name of the command, for logging.
    pub fn kind(&self) -> &str {
        match self {
            ClientCommand::StartSession => "start_session",
            ClientCommand::StopSession => "stop_session",
            ClientCommand::Ping => "ping",
            ClientCommand::AudioChunk { .. } => "audio_chunk",
            ClientCommand::SimulatedInput { .. } => "test_audio",
            ClientCommand::Unknown(kind) => kind,
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Messages sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayOutgoingMessage {
    Status {
        status: String,
        message: String,
    },

    Transcript {
        text: String,
        #[serde(rename = "isUser")]
        is_user: bool,
    },

    /// The complete current list
    ListUpdated {
        list: ExtractedListState,
    },

    /// Delivery receipt for one audio chunk (not an upstream ack)
    AudioReceived {
        timestamp: Value,
        chunk_size: usize,
    },

    SessionStarted {
        user_id: String,
        message: String,
    },

    SessionStopped {
        message: String,
    },

    Pong {
        timestamp: String,
    },

    Error {
        message: String,
    },
}

impl RelayOutgoingMessage {
    pub fn status(status: &str, message: impl Into<String>) -> Self {
        RelayOutgoingMessage::Status {
            status: status.to_string(),
            message: message.into(),
        }
    }

    pub fn transcript(text: impl Into<String>, is_user: bool) -> Self {
        RelayOutgoingMessage::Transcript {
            text: text.into(),
            is_user,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RelayOutgoingMessage::Error {
            message: message.into(),
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// What the session writer should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayRoute {
    Outgoing(RelayOutgoingMessage),
    Close,
}

/// One data frame received from the client transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl ClientFrame {
    pub fn decode(&self) -> Result<ClientCommand, DecodeError> {
        match self {
            ClientFrame::Text(text) => ClientCommand::parse(text),
            ClientFrame::Binary(data) => ClientCommand::parse_bytes(data),
        }
    }
}
