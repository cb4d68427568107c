//! Gemini Live API connector.
//!
//! [`GeminiConnector::connect`] opens the WebSocket, sends the setup frame and
//! hands the socket to two tasks. The writer forwards encoded frames from the
//! link and answers pings; the reader decodes incoming frames into events.
//! When the socket ends for any reason the link is marked disconnected and the
//! event sequence ends with [`UpstreamEvent::ConnectionClosed`].
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON frames, text or binary
//! - Audio: opaque payload forwarded with MIME type `audio/pcm`

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::config::GeminiConfig;
use super::messages::{ClientMessage, decode_server_message};
use crate::core::upstream::base::{
    ConnectError, ConnectResult, LINK_CHANNEL_CAPACITY, PeerEvents, UpstreamConnector,
    UpstreamEvent, UpstreamLink, UpstreamPeer,
};

type GeminiSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens links to the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    config: GeminiConfig,
}

impl GeminiConnector {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn setup_frame(&self) -> ConnectResult<String> {
        let setup = ClientMessage::setup(&self.config.model, &self.config.system_instruction);
        serde_json::to_string(&setup).map_err(|e| ConnectError::HandshakeFailed(e.to_string()))
    }
}

#[async_trait]
impl UpstreamConnector for GeminiConnector {
    async fn connect(&self) -> ConnectResult<UpstreamLink> {
        if self.config.api_key.is_empty() {
            return Err(ConnectError::MissingApiKey);
        }

        let url = self.config.ws_url()?;
        let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ConnectError::ConnectionFailed(e.to_string()))?;

        info!(model = %self.config.model, "Connected to Gemini Live API");

        let setup = self.setup_frame()?;
        if let Err(e) = ws.send(Message::Text(setup.into())).await {
            let _ = ws.close(None).await;
            return Err(ConnectError::HandshakeFailed(e.to_string()));
        }
        debug!("Setup frame sent");

        let (link, peer) = UpstreamLink::channel(LINK_CHANNEL_CAPACITY);
        tokio::spawn(run_transport(ws, peer));

        Ok(link)
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

/// Deliver every event decoded from one frame, in order. Returns false once
/// the link side has dropped its event sequence.
async fn deliver(events: &PeerEvents, text: &str) -> bool {
    for event in decode_server_message(text) {
        if !events.send(event).await {
            return false;
        }
    }
    true
}

/// Socket reader. Runs on its own task so that a slow event consumer never
/// stops the writer from draining outbound frames. Pings are handed to the
/// writer as pongs; the task ends when the socket does.
async fn read_frames(
    mut stream: SplitStream<GeminiSocket>,
    events: PeerEvents,
    replies: mpsc::UnboundedSender<Message>,
) {
    while let Some(msg) = stream.next().await {
        let delivered = match msg {
            Ok(Message::Text(text)) => deliver(&events, text.as_str()).await,
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => deliver(&events, text).await,
                Err(e) => {
                    warn!("Binary upstream frame is not UTF-8: {}", e);
                    events.send(UpstreamEvent::Malformed(e.to_string())).await
                }
            },
            Ok(Message::Ping(data)) => replies.send(Message::Pong(data)).is_ok(),
            Ok(Message::Close(frame)) => {
                info!(?frame, "Gemini closed the connection");
                return;
            }
            Ok(_) => true,
            Err(e) => {
                error!("Gemini WebSocket error: {}", e);
                return;
            }
        };

        if !delivered {
            debug!("Event receiver dropped, discarding upstream events");
            return;
        }
    }
    info!("Gemini stream ended");
}

/// Socket writer. Forwards link frames and pongs until shutdown, link drop or
/// the reader finishing. The event sequence closes once both tasks are gone.
async fn run_transport(ws: GeminiSocket, mut peer: UpstreamPeer) {
    let (mut sink, stream) = ws.split();
    let shutdown = peer.shutdown_token();
    let (reply_tx, mut replies) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_frames(stream, peer.event_sender(), reply_tx));

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Upstream shutdown requested");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            frame = peer.recv_frame() => {
                let Some(frame) = frame else {
                    debug!("Upstream link dropped");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };

                let json = match serde_json::to_string(&ClientMessage::from(frame)) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize upstream frame: {}", e);
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    error!("Failed to send upstream frame: {}", e);
                    break;
                }
            }

            reply = replies.recv() => {
                // The reader dropping its sender means the socket ended
                let Some(reply) = reply else { break };
                if let Err(e) = sink.send(reply).await {
                    error!("Failed to send pong: {}", e);
                }
            }
        }
    }

    peer.mark_disconnected();
    reader.abort();
    debug!("Upstream transport task finished");
}
