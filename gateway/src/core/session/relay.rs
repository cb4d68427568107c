//! Session relay.
//!
//! A [`SessionRelay`] pairs one client connection with one upstream link. It
//! runs two pumps:
//!
//! - the command loop, in the caller's task, which decodes client frames in
//!   arrival order and forwards audio upstream
//! - the upstream pump, a spawned task, which translates upstream events and
//!   writes the results to the client
//!
//! The pumps never touch each other's state. The upstream pump reaches the
//! client through the [`SendGate`] and reaches the command loop through
//! [`PumpSignal`]s; the command loop stops the pump through a cancellation
//! token.
//!
//! # State machine
//!
//! ```text
//! Created → Handshaking → Active → Draining → Closed
//!                └──────────────────────────────┘ (connect failed)
//! ```

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::gate::{SendGate, TransportError};
use super::messages::{
    ClientCommand, ClientFrame, DEFAULT_TEST_UTTERANCE, RelayOutgoingMessage,
};
use super::registry::{SessionHandle, SessionRegistry};
use super::state::{RelayState, Session};
use crate::core::extraction::ExtractedListState;
use crate::core::translator::{EventTranslator, TranslatedAction};
use crate::core::upstream::{UpstreamConnector, UpstreamEvents, UpstreamLink};
use crate::utils::{rfc3339_now, unix_seconds};

/// Error text sent to the client when the upstream handshake fails.
pub const UPSTREAM_CONNECT_FAILED: &str = "Failed to connect to upstream API";

const SESSION_STARTED_MESSAGE: &str = "Session started successfully";
const SESSION_STOPPED_MESSAGE: &str = "Session stopped";

/// Messages from the upstream pump to the command loop.
#[derive(Debug)]
enum PumpSignal {
    /// The model reported a new complete list
    ListReplaced(ExtractedListState),
    /// The upstream closed; the session should drain
    UpstreamClosed,
    /// The client could not be written to
    ClientGone,
}

/// Whether the command loop keeps going after a command.
enum Flow {
    Continue,
    Stop,
}

struct Pump {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    signals: mpsc::UnboundedReceiver<PumpSignal>,
}

/// Relay for one client session.
pub struct SessionRelay {
    handle: SessionHandle,
    session: Session,
    gate: SendGate,
    connector: Arc<dyn UpstreamConnector>,
    registry: Arc<SessionRegistry>,
    state: RelayState,
}

impl SessionRelay {
    pub fn new(
        handle: SessionHandle,
        gate: SendGate,
        connector: Arc<dyn UpstreamConnector>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let session = Session::new(handle.snapshot_cell());
        Self {
            handle,
            session,
            gate,
            connector,
            registry,
            state: RelayState::Created,
        }
    }

    fn transition(&mut self, next: RelayState) {
        if !self.state.can_transition_to(next) {
            warn!(
                user_id = %self.handle.identity(),
                from = %self.state,
                to = %next,
                "Unexpected relay state transition"
            );
        }
        debug!(user_id = %self.handle.identity(), from = %self.state, to = %next, "Relay state");
        self.state = next;
    }

    /// Drive the session until it closes and return its final state.
    ///
    /// `inbound` yields client data frames; it ends when the client
    /// disconnects.
    pub async fn run<S>(mut self, inbound: S) -> Session
    where
        S: Stream<Item = Result<ClientFrame, TransportError>> + Send,
    {
        let user_id = self.handle.identity().to_string();
        self.transition(RelayState::Handshaking);

        let mut link = match self.connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Upstream connect failed");
                if let Err(e) = self
                    .gate
                    .send(RelayOutgoingMessage::error(UPSTREAM_CONNECT_FAILED))
                    .await
                {
                    debug!(user_id = %user_id, error = %e, "Could not report connect failure");
                }
                self.teardown(None, None).await;
                return self.session;
            }
        };

        self.transition(RelayState::Active);
        info!(user_id = %user_id, "Session active");

        let events = link.receive();
        let link = Arc::new(link);
        let mut pump = self.spawn_pump(events, link.clone());

        let cancel = self.handle.cancellation_token();
        let mut inbound = std::pin::pin!(inbound);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(user_id = %user_id, "Session cancelled");
                    break;
                }

                signal = pump.signals.recv() => match signal {
                    Some(PumpSignal::ListReplaced(list)) => self.session.replace_list(list),
                    Some(PumpSignal::UpstreamClosed) => {
                        info!(user_id = %user_id, "Upstream closed, draining session");
                        break;
                    }
                    Some(PumpSignal::ClientGone) | None => break,
                },

                frame = inbound.next() => match frame {
                    Some(Ok(frame)) => {
                        self.session.touch();
                        let handled = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                info!(user_id = %user_id, "Session cancelled mid-command");
                                break;
                            }
                            handled = self.handle_frame(frame, &link) => handled,
                        };
                        match handled {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Stop) => break,
                            Err(e) => {
                                warn!(user_id = %user_id, error = %e, "Client send failed");
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(user_id = %user_id, error = %e, "Client receive failed");
                        break;
                    }
                    None => {
                        info!(user_id = %user_id, "Client disconnected");
                        break;
                    }
                },
            }
        }

        self.transition(RelayState::Draining);
        self.teardown(Some(pump), Some(link)).await;
        self.session
    }

    fn spawn_pump(&self, events: UpstreamEvents, link: Arc<UpstreamLink>) -> Pump {
        let cancel = self.handle.cancellation_token().child_token();
        let (signal_tx, signals) = mpsc::unbounded_channel();
        let task = tokio::spawn(pump_upstream(
            events,
            link,
            self.gate.clone(),
            signal_tx,
            cancel.clone(),
            self.handle.identity().to_string(),
        ));
        Pump {
            task,
            cancel,
            signals,
        }
    }

    async fn handle_frame(
        &mut self,
        frame: ClientFrame,
        link: &UpstreamLink,
    ) -> Result<Flow, TransportError> {
        let user_id = self.handle.identity();

        let command = match frame.decode() {
            Ok(command) => command,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Undecodable client frame");
                self.gate.send(RelayOutgoingMessage::error(e.to_string())).await?;
                return Ok(Flow::Continue);
            }
        };

        debug!(user_id = %user_id, message_type = command.kind(), "Client command");
        match command {
            ClientCommand::Ping => {
                self.gate
                    .send(RelayOutgoingMessage::Pong {
                        timestamp: rfc3339_now(),
                    })
                    .await?;
            }
            ClientCommand::StartSession => {
                info!(user_id = %user_id, "Session start requested");
                self.gate
                    .send(RelayOutgoingMessage::SessionStarted {
                        user_id: user_id.to_string(),
                        message: SESSION_STARTED_MESSAGE.to_string(),
                    })
                    .await?;
            }
            ClientCommand::AudioChunk {
                audio_data,
                timestamp,
            } => {
                let Some(payload) = audio_data.filter(|data| !data.is_empty()) else {
                    warn!(user_id = %user_id, "Audio chunk without audio_data ignored");
                    return Ok(Flow::Continue);
                };

                debug!(user_id = %user_id, chunk_size = payload.len(), "Audio chunk received");
                if let Err(e) = link.send_audio(&payload).await {
                    warn!(user_id = %user_id, error = %e, "Failed to forward audio chunk");
                }

                self.gate
                    .send(RelayOutgoingMessage::AudioReceived {
                        timestamp: timestamp.unwrap_or_else(|| json!(unix_seconds())),
                        chunk_size: payload.len(),
                    })
                    .await?;
            }
            ClientCommand::SimulatedInput { text } => {
                let text = text.unwrap_or_else(|| DEFAULT_TEST_UTTERANCE.to_string());
                info!(user_id = %user_id, text = %text, "Simulated input");

                self.gate
                    .send(RelayOutgoingMessage::transcript(text, true))
                    .await?;

                let list = ExtractedListState::sample();
                self.session.replace_list(list.clone());
                self.gate
                    .send(RelayOutgoingMessage::ListUpdated { list })
                    .await?;
            }
            ClientCommand::StopSession => {
                info!(user_id = %user_id, "Session stop requested");
                self.gate
                    .send(RelayOutgoingMessage::SessionStopped {
                        message: SESSION_STOPPED_MESSAGE.to_string(),
                    })
                    .await?;
                return Ok(Flow::Stop);
            }
            ClientCommand::Unknown(kind) => {
                warn!(user_id = %user_id, message_type = %kind, "Unknown client message ignored");
            }
        }

        Ok(Flow::Continue)
    }

    /// Release everything the session holds. Every step runs regardless of
    /// how the previous one went.
    ///
    /// The link closes before the pump is awaited, and every await in the
    /// pump also watches its cancellation token, so neither a stalled upstream
    /// nor a client that stopped reading can hold teardown open.
    async fn teardown(&mut self, pump: Option<Pump>, link: Option<Arc<UpstreamLink>>) {
        let user_id = self.handle.identity().to_string();

        if let Some(pump) = &pump {
            pump.cancel.cancel();
        }
        if let Some(link) = link {
            link.close();
        }

        if let Some(mut pump) = pump {
            if let Err(e) = (&mut pump.task).await {
                error!(user_id = %user_id, error = %e, "Upstream pump ended abnormally");
            }
            while let Ok(signal) = pump.signals.try_recv() {
                if let PumpSignal::ListReplaced(list) = signal {
                    self.session.replace_list(list);
                }
            }
        }

        if !self.registry.release(&self.handle) {
            debug!(user_id = %user_id, "Registry entry already gone or replaced");
        }

        self.gate.close();
        self.session.mark_disconnected();
        self.transition(RelayState::Closed);
        info!(user_id = %user_id, "Session closed");
    }
}

/// Upstream → client pump.
async fn pump_upstream(
    mut events: UpstreamEvents,
    link: Arc<UpstreamLink>,
    gate: SendGate,
    signals: mpsc::UnboundedSender<PumpSignal>,
    cancel: CancellationToken,
    user_id: String,
) {
    let mut translator = EventTranslator::new();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            let _ = signals.send(PumpSignal::UpstreamClosed);
            break;
        };

        for action in translator.translate(event) {
            match action {
                TranslatedAction::Client(message) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if let RelayOutgoingMessage::ListUpdated { list } = &message {
                        let _ = signals.send(PumpSignal::ListReplaced(list.clone()));
                    }
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        sent = gate.send(message) => sent,
                    };
                    if let Err(e) = sent {
                        warn!(user_id = %user_id, error = %e, "Client unreachable from upstream pump");
                        let _ = signals.send(PumpSignal::ClientGone);
                        return;
                    }
                }
                TranslatedAction::AckToolCall {
                    call_id,
                    function_name,
                    response,
                } => {
                    link.send_tool_result(&call_id, &function_name, response);
                }
                TranslatedAction::Terminate => {
                    let _ = signals.send(PumpSignal::UpstreamClosed);
                    debug!(
                        user_id = %user_id,
                        decode_errors = translator.decode_errors(),
                        "Upstream pump finished"
                    );
                    return;
                }
            }
        }
    }

    debug!(user_id = %user_id, "Upstream pump stopped");
}
