//! Upstream event translation.
//!
//! Maps one [`UpstreamEvent`] to the client messages it produces and the
//! acknowledgement the upstream expects. Every tool call is acknowledged,
//! known or not, since an unacknowledged call stalls the upstream session.

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::extraction::ExtractedListState;
use crate::core::session::messages::{
    RelayOutgoingMessage, STATUS_LISTENING, STATUS_UPSTREAM_CLOSED,
};
use crate::core::upstream::UpstreamEvent;
use crate::core::upstream::gemini::EXTRACTION_FUNCTION_NAME;

/// One effect of a translated event.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatedAction {
    /// Send this message to the client
    Client(RelayOutgoingMessage),
    /// Acknowledge a tool call upstream
    AckToolCall {
        call_id: String,
        function_name: String,
        response: Value,
    },
    /// Stop the upstream pump
    Terminate,
}

/// Generic success payload used for every tool call acknowledgement.
pub fn tool_success_payload() -> Value {
    json!({"result": "success"})
}

/// Translates upstream events into relay actions.
#[derive(Debug, Default)]
pub struct EventTranslator {
    decode_errors: u64,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of malformed upstream frames seen so far.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Translate one event.
    ///
    /// Produces zero, one or two actions. A `ListUpdated` message always comes
    /// before its acknowledgement.
    pub fn translate(&mut self, event: UpstreamEvent) -> Vec<TranslatedAction> {
        match event {
            UpstreamEvent::SetupAck => {
                info!("Upstream setup complete");
                vec![TranslatedAction::Client(RelayOutgoingMessage::status(
                    STATUS_LISTENING,
                    "Upstream API ready",
                ))]
            }
            UpstreamEvent::TextContent(text) => {
                debug!(text = %text, "Upstream text");
                vec![TranslatedAction::Client(RelayOutgoingMessage::transcript(
                    text, false,
                ))]
            }
            UpstreamEvent::ToolCall {
                call_id,
                function_name,
                arguments,
            } => {
                let mut actions = Vec::with_capacity(2);
                if function_name == EXTRACTION_FUNCTION_NAME {
                    let list = ExtractedListState::from_arguments(&arguments);
                    info!(
                        items = list.items.len(),
                        confidence = list.confidence,
                        "List extracted"
                    );
                    actions.push(TranslatedAction::Client(RelayOutgoingMessage::ListUpdated {
                        list,
                    }));
                } else {
                    warn!(function_name = %function_name, "Unrecognized tool call, acknowledging only");
                }
                actions.push(TranslatedAction::AckToolCall {
                    call_id,
                    function_name,
                    response: tool_success_payload(),
                });
                actions
            }
            UpstreamEvent::Malformed(reason) => {
                self.decode_errors += 1;
                warn!(
                    reason = %reason,
                    decode_errors = self.decode_errors,
                    "Malformed upstream frame ignored"
                );
                Vec::new()
            }
            UpstreamEvent::ConnectionClosed => vec![
                TranslatedAction::Client(RelayOutgoingMessage::status(
                    STATUS_UPSTREAM_CLOSED,
                    "Upstream connection closed",
                )),
                TranslatedAction::Terminate,
            ],
        }
    }
}
