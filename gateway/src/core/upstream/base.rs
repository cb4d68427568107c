//! Base types for the upstream streaming conversational API.
//!
//! This module defines the transport-agnostic half of an upstream connection:
//! the decoded event type, the outbound frame type, the [`UpstreamLink`] handle
//! shared by both session pumps, and the [`UpstreamConnector`] trait that a
//! concrete transport implements.
//!
//! # Architecture
//!
//! A connector opens the transport, performs the handshake and then spawns a
//! transport task that owns the socket. The task and the link communicate only
//! through two channels and a shutdown token:
//!
//! ```text
//!  UpstreamLink ──UpstreamFrame──▶ transport task ──▶ socket
//!  UpstreamLink ◀─UpstreamEvent─── transport task ◀── socket
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Channel capacity between a link and its transport task.
pub const LINK_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while opening an upstream connection.
///
/// A connect error is fatal to session startup: the relay reports it once to
/// the client and never enters the active state.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No API key was configured
    #[error("API key is required")]
    MissingApiKey,

    /// The endpoint URL could not be built
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// The transport could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport opened but the handshake frame could not be sent
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Errors raised while sending to an open upstream link.
#[derive(Debug, Error)]
pub enum SendError {
    /// The transport task is gone
    #[error("Upstream link closed")]
    Closed,
}

/// Result type for connect operations.
pub type ConnectResult<T> = Result<T, ConnectError>;

// =============================================================================
// Events and Frames
// =============================================================================

/// One decoded event received from the upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// The handshake was accepted
    SetupAck,
    /// A piece of model text output
    TextContent(String),
    /// A structured function call that must be acknowledged
    ToolCall {
        call_id: String,
        function_name: String,
        arguments: Value,
    },
    /// The upstream closed or the transport failed; always the last event
    ConnectionClosed,
    /// A frame that could not be decoded, with the decoder's reason
    Malformed(String),
}

/// One frame sent to the upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    /// Opaque encoded audio payload
    Audio(String),
    /// Acknowledgement of a tool call
    ToolResult {
        call_id: String,
        function_name: String,
        response: Value,
    },
}

/// Lazy sequence of upstream events.
///
/// Yields a terminal [`UpstreamEvent::ConnectionClosed`] exactly once and then
/// ends.
pub type UpstreamEvents = BoxStream<'static, UpstreamEvent>;

fn event_stream(rx: Option<mpsc::Receiver<UpstreamEvent>>) -> UpstreamEvents {
    let Some(rx) = rx else {
        return stream::empty().boxed();
    };

    stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Some(UpstreamEvent::ConnectionClosed) | None => {
                Some((UpstreamEvent::ConnectionClosed, None))
            }
            Some(event) => Some((event, Some(rx))),
        }
    })
    .boxed()
}

// =============================================================================
// Link
// =============================================================================

/// Handle to one open upstream connection.
///
/// The command loop uses it to forward audio, the upstream pump uses it to
/// acknowledge tool calls. Both methods take `&self` so the link can be shared
/// through an `Arc` once [`UpstreamLink::receive`] has handed out the event
/// sequence.
pub struct UpstreamLink {
    outbound: mpsc::Sender<UpstreamFrame>,
    events: Option<mpsc::Receiver<UpstreamEvent>>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// Transport side of an [`UpstreamLink`].
///
/// Owned by whatever moves bytes to and from the upstream: the WebSocket
/// transport task in production, a scripted peer in tests.
pub struct UpstreamPeer {
    events: mpsc::Sender<UpstreamEvent>,
    frames: mpsc::Receiver<UpstreamFrame>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl UpstreamLink {
    /// Create a connected link together with its transport peer.
    pub fn channel(capacity: usize) -> (UpstreamLink, UpstreamPeer) {
        let (frame_tx, frame_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        let link = UpstreamLink {
            outbound: frame_tx,
            events: Some(event_rx),
            connected: connected.clone(),
            shutdown: shutdown.clone(),
            closed: AtomicBool::new(false),
        };
        let peer = UpstreamPeer {
            events: event_tx,
            frames: frame_rx,
            connected,
            shutdown,
        };
        (link, peer)
    }

    /// Whether the transport is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Forward one audio payload.
    ///
    /// Audio received while the link is down is dropped with a warning rather
    /// than queued; live audio cannot be replayed upstream.
    pub async fn send_audio(&self, payload: &str) -> Result<(), SendError> {
        if !self.is_connected() {
            warn!("Cannot send audio - upstream not connected, dropping chunk");
            return Ok(());
        }

        self.outbound
            .send(UpstreamFrame::Audio(payload.to_owned()))
            .await
            .map_err(|_| SendError::Closed)?;

        debug!(chunk_size = payload.len(), "Audio chunk queued for upstream");
        Ok(())
    }

    /// Acknowledge a tool call. Best effort: failures are logged only.
    ///
    /// Never waits for queue space, so a stalled transport cannot block the
    /// caller.
    pub fn send_tool_result(&self, call_id: &str, function_name: &str, response: Value) {
        if !self.is_connected() {
            debug!(call_id, "Skipping tool result - upstream not connected");
            return;
        }

        let frame = UpstreamFrame::ToolResult {
            call_id: call_id.to_owned(),
            function_name: function_name.to_owned(),
            response,
        };
        match self.outbound.try_send(frame) {
            Ok(()) => debug!(call_id, function_name, "Tool result queued for upstream"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(call_id, "Dropping tool result: upstream queue full")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(call_id, "Failed to send tool result: upstream link closed")
            }
        }
    }

    /// Take the lazy event sequence.
    ///
    /// Only the first call returns the live sequence; later calls get an empty
    /// one. A fresh sequence requires a fresh connect.
    pub fn receive(&mut self) -> UpstreamEvents {
        event_stream(self.events.take())
    }

    /// Close the link. Safe to call any number of times, including after the
    /// transport already failed; the shutdown is signalled exactly once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        info!("Upstream link closed");
    }

    /// Whether [`UpstreamLink::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for UpstreamLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl UpstreamPeer {
    /// Deliver a decoded event to the link. Returns false once the link side
    /// has dropped its event sequence.
    pub async fn send_event(&self, event: UpstreamEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Next outbound frame, or `None` once the link is dropped.
    pub async fn recv_frame(&mut self) -> Option<UpstreamFrame> {
        self.frames.recv().await
    }

    /// Sender for decoded events, for a transport that reads on its own task.
    pub fn event_sender(&self) -> PeerEvents {
        PeerEvents {
            events: self.events.clone(),
        }
    }

    /// Token cancelled when the link side requests shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolves when the link side requested shutdown.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    /// Whether the link side requested shutdown.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Mark the transport as gone so further audio is dropped.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Event half of an [`UpstreamPeer`].
///
/// The event sequence ends only once the peer and every `PeerEvents` clone
/// are dropped.
#[derive(Clone)]
pub struct PeerEvents {
    events: mpsc::Sender<UpstreamEvent>,
}

impl PeerEvents {
    /// Deliver a decoded event. Returns false once the link side has dropped
    /// its event sequence.
    pub async fn send(&self, event: UpstreamEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens upstream connections.
///
/// Configuration such as the API key is injected at construction time; a
/// connector is shared by every session in the process.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open the transport and send the handshake frame.
    async fn connect(&self) -> ConnectResult<UpstreamLink>;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool;
}
