//! Client WebSocket handler
//!
//! Upgrades `GET /ws/{user_id}` and hands the socket to a [`SessionRelay`].
//! A writer task owns the sending half of the socket and drains the session's
//! [`SendGate`]; the receiving half becomes the relay's inbound stream.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::session::{
    ClientFrame, GATE_CHANNEL_CAPACITY, RelayRoute, SendGate, SessionRelay, TransportError,
};
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long the writer may keep flushing after the relay finishes
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay WebSocket handler
///
/// The path segment is the client identity. A second connection with the
/// same identity replaces the first.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(user_id = %user_id, "Relay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, user_id, state))
}

/// Map one WebSocket message to a relay frame. Control frames map to `None`.
fn to_client_frame(
    message: Result<Message, axum::Error>,
) -> Option<Result<ClientFrame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(ClientFrame::Text(text.to_string()))),
        Ok(Message::Binary(data)) => Some(Ok(ClientFrame::Binary(data.to_vec()))),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
        Err(e) => Some(Err(TransportError::Failed(e.to_string()))),
    }
}

async fn run_writer(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut routes: mpsc::Receiver<RelayRoute>,
    session_cancel: CancellationToken,
) {
    while let Some(route) = routes.recv().await {
        let should_close = matches!(route, RelayRoute::Close);

        let result = match route {
            RelayRoute::Outgoing(message) => match serde_json::to_string(&message) {
                Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            },
            RelayRoute::Close => {
                debug!("Closing relay WebSocket connection");
                sender.send(Message::Close(None)).await
            }
        };

        if let Err(e) = result {
            error!("Failed to send WebSocket message: {}", e);
            session_cancel.cancel();
            break;
        }

        if should_close {
            break;
        }
    }
}

/// Handle the relay WebSocket connection
async fn handle_relay_socket(socket: WebSocket, user_id: String, app_state: Arc<AppState>) {
    info!(user_id = %user_id, "Relay WebSocket connection established");

    let (sender, receiver) = socket.split();
    let (gate, routes) = SendGate::channel(GATE_CHANNEL_CAPACITY);

    let handle = app_state.registry.create(&user_id, gate.clone());
    let mut writer = tokio::spawn(run_writer(sender, routes, handle.cancellation_token()));

    // A close frame ends the inbound stream
    let inbound = receiver
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| future::ready(to_client_frame(message)));

    let relay = SessionRelay::new(
        handle,
        gate,
        app_state.connector.clone(),
        app_state.registry.clone(),
    );
    let session = relay.run(inbound).await;

    // A client that stopped reading can park the writer on the socket
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Err(e)) => error!(user_id = %user_id, error = %e, "Relay writer task failed"),
        Ok(Ok(())) => {}
        Err(_) => {
            warn!(user_id = %user_id, "Relay writer did not drain in time, aborting");
            writer.abort();
        }
    }

    info!(
        user_id = %user_id,
        items = session.last_extracted_list.as_ref().map_or(0, |l| l.items.len()),
        "Relay WebSocket connection closed"
    );
}
