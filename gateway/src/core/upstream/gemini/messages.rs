//! Gemini Live API message types.
//!
//! Outbound messages are externally tagged by their top-level key
//! (`setup`, `realtimeInput`, `toolResponse`). Inbound frames may carry any
//! combination of `setupComplete`, `serverContent` and `toolCall`, so they are
//! decoded into a flat struct and then expanded into [`UpstreamEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::config::{AUDIO_MIME_TYPE, EXTRACTION_FUNCTION_DESCRIPTION, EXTRACTION_FUNCTION_NAME};
use crate::core::upstream::base::{UpstreamEvent, UpstreamFrame};

// =============================================================================
// Shared
// =============================================================================

/// Content made of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One content part. Only text parts are of interest to the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    /// Content with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

// =============================================================================
// Outbound (Relay -> Gemini)
// =============================================================================

/// Messages sent to the Gemini Live API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Handshake, sent exactly once right after the socket opens
    Setup(Setup),
    /// Streaming audio input
    RealtimeInput(RealtimeInput),
    /// Acknowledgement of function calls
    ToolResponse(ToolResponse),
}

/// Session setup declared in the handshake.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub system_instruction: Content,
    pub tools: Vec<Tool>,
}

/// A tool group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// A callable function the model may invoke.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Realtime audio input envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// One chunk of encoded media.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

/// Function call acknowledgements.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Acknowledgement of a single function call.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub name: String,
    pub id: String,
    pub response: Value,
}

/// JSON schema of the list-extraction function parameters.
pub fn extraction_parameters_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "items": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": {"type": "STRING"},
                        "quantity": {"type": "NUMBER", "default": 1},
                        "unit": {"type": "STRING"},
                        "category": {"type": "STRING", "default": "general"}
                    },
                    "required": ["name", "quantity"]
                }
            },
            "confidence": {"type": "NUMBER", "default": 0.8}
        },
        "required": ["items"]
    })
}

impl ClientMessage {
    /// Build the handshake frame.
    pub fn setup(model: &str, system_instruction: &str) -> Self {
        ClientMessage::Setup(Setup {
            model: model.to_string(),
            system_instruction: Content::text(system_instruction),
            tools: vec![Tool {
                function_declarations: vec![FunctionDeclaration {
                    name: EXTRACTION_FUNCTION_NAME.to_string(),
                    description: EXTRACTION_FUNCTION_DESCRIPTION.to_string(),
                    parameters: extraction_parameters_schema(),
                }],
            }],
        })
    }
}

impl From<UpstreamFrame> for ClientMessage {
    fn from(frame: UpstreamFrame) -> Self {
        match frame {
            UpstreamFrame::Audio(data) => ClientMessage::RealtimeInput(RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: AUDIO_MIME_TYPE.to_string(),
                    data,
                }],
            }),
            UpstreamFrame::ToolResult {
                call_id,
                function_name,
                response,
            } => ClientMessage::ToolResponse(ToolResponse {
                function_responses: vec![FunctionResponse {
                    name: function_name,
                    id: call_id,
                    response,
                }],
            }),
        }
    }
}

// =============================================================================
// Inbound (Gemini -> Relay)
// =============================================================================

/// A frame received from the Gemini Live API.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
}

/// Model output. Text may sit directly under `parts` or inside `modelTurn`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub model_turn: Option<Content>,
}

/// Function calls requested by the model.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// One function call.
#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ServerMessage {
    /// Expand the frame into events, in the order setup, text, tool calls.
    pub fn into_events(self) -> Vec<UpstreamEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(UpstreamEvent::SetupAck);
        }

        if let Some(content) = self.server_content {
            let turn_parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
            events.extend(
                content
                    .parts
                    .into_iter()
                    .chain(turn_parts)
                    .filter_map(|part| part.text)
                    .map(UpstreamEvent::TextContent),
            );
        }

        if let Some(tool_call) = self.tool_call {
            events.extend(tool_call.function_calls.into_iter().map(|call| {
                UpstreamEvent::ToolCall {
                    call_id: call.id.unwrap_or_default(),
                    function_name: call.name,
                    arguments: call.args,
                }
            }));
        }

        events
    }
}

/// Decode one text frame into events. Undecodable frames become a single
/// [`UpstreamEvent::Malformed`].
pub fn decode_server_message(text: &str) -> Vec<UpstreamEvent> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => message.into_events(),
        Err(e) => vec![UpstreamEvent::Malformed(e.to_string())],
    }
}
