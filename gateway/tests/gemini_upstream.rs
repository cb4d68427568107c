//! Gemini transport tests against a local mock Live API server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use voicelist_gateway::core::upstream::gemini::{
    AUDIO_MIME_TYPE, EXTRACTION_FUNCTION_NAME, GeminiConfig, GeminiConnector,
};
use voicelist_gateway::core::upstream::{
    LINK_CHANNEL_CAPACITY, UpstreamConnector, UpstreamEvent, UpstreamEvents, UpstreamLink,
};

const STEP_TIMEOUT: Duration = Duration::from_secs(2);

type ServerSocket = WebSocketStream<TcpStream>;

struct MockUpstream {
    socket: ServerSocket,
    query: String,
}

impl MockUpstream {
    /// Next JSON frame from the client, skipping control frames.
    async fn next_json(&mut self) -> Value {
        loop {
            let msg = timeout(STEP_TIMEOUT, self.socket.next())
                .await
                .expect("timed out waiting for client frame")
                .expect("client closed")
                .expect("socket error");
            match msg {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    async fn send_json(&mut self, value: Value) {
        self.socket
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }
}

/// Bind a one-shot mock server. Returns its URL and the accepted socket.
async fn mock_upstream() -> (String, JoinHandle<MockUpstream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut query = String::new();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().unwrap_or_default().to_string();
            Ok(resp)
        };
        let socket = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        MockUpstream { socket, query }
    });

    (format!("ws://{addr}/ws/live"), server)
}

fn connector_for(url: &str) -> GeminiConnector {
    let mut config = GeminiConfig::new("test-key");
    config.url = url.to_string();
    config.model = "models/test-model".to_string();
    config.system_instruction = "Keep the list".to_string();
    GeminiConnector::new(config)
}

async fn open() -> (UpstreamLink, MockUpstream) {
    let (url, server) = mock_upstream().await;
    let link = connector_for(&url).connect().await.unwrap();
    let mut upstream = timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();

    // Every test starts after the handshake frame
    let setup = upstream.next_json().await;
    assert!(setup.get("setup").is_some());
    (link, upstream)
}

async fn next_event(events: &mut UpstreamEvents) -> Option<UpstreamEvent> {
    timeout(STEP_TIMEOUT, events.next())
        .await
        .expect("timed out waiting for upstream event")
}

#[tokio::test]
async fn test_handshake_sends_setup_with_key() {
    let (url, server) = mock_upstream().await;
    let link = connector_for(&url).connect().await.unwrap();
    let mut upstream = timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();

    assert_eq!(upstream.query, "key=test-key");
    assert!(link.is_connected());

    let setup = upstream.next_json().await;
    let setup = &setup["setup"];
    assert_eq!(setup["model"], "models/test-model");
    assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Keep the list");

    let declarations = setup["tools"][0]["functionDeclarations"].as_array().unwrap();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0]["name"], EXTRACTION_FUNCTION_NAME);
    assert_eq!(
        declarations[0]["parameters"]["required"],
        json!(["items"])
    );
}

#[tokio::test]
async fn test_audio_forwarded_in_realtime_envelope() {
    let (link, mut upstream) = open().await;

    link.send_audio("UklGRg==").await.unwrap();
    link.send_audio("AAAA").await.unwrap();

    let first = upstream.next_json().await;
    assert_eq!(
        first,
        json!({"realtimeInput": {"mediaChunks": [{"mimeType": AUDIO_MIME_TYPE, "data": "UklGRg=="}]}})
    );
    let second = upstream.next_json().await;
    assert_eq!(second["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");
}

#[tokio::test]
async fn test_tool_result_frame() {
    let (link, mut upstream) = open().await;

    link.send_tool_result("call-1", EXTRACTION_FUNCTION_NAME, json!({"result": "success"}));

    let frame = upstream.next_json().await;
    assert_eq!(
        frame,
        json!({"toolResponse": {"functionResponses": [{
            "name": EXTRACTION_FUNCTION_NAME,
            "id": "call-1",
            "response": {"result": "success"}
        }]}})
    );
}

#[tokio::test]
async fn test_server_frames_decoded_in_order() {
    let (mut link, mut upstream) = open().await;
    let mut events = link.receive();

    upstream.send_json(json!({"setupComplete": {}})).await;
    upstream
        .socket
        .send(Message::Binary(
            json!({"serverContent": {"modelTurn": {"parts": [{"text": "Added milk"}]}}})
                .to_string()
                .into_bytes()
                .into(),
        ))
        .await
        .unwrap();
    upstream.send_json(json!({"unrelated": true})).await;
    upstream
        .send_json(json!({"toolCall": {"functionCalls": [{
            "id": "c1",
            "name": EXTRACTION_FUNCTION_NAME,
            "args": {"items": [{"name": "milk", "quantity": 1}]}
        }]}}))
        .await;
    upstream.send_json(json!("not an object")).await;

    assert_eq!(next_event(&mut events).await, Some(UpstreamEvent::SetupAck));
    assert_eq!(
        next_event(&mut events).await,
        Some(UpstreamEvent::TextContent("Added milk".to_string()))
    );
    assert_eq!(
        next_event(&mut events).await,
        Some(UpstreamEvent::ToolCall {
            call_id: "c1".to_string(),
            function_name: EXTRACTION_FUNCTION_NAME.to_string(),
            arguments: json!({"items": [{"name": "milk", "quantity": 1}]}),
        })
    );
    assert!(matches!(
        next_event(&mut events).await,
        Some(UpstreamEvent::Malformed(_))
    ));
}

#[tokio::test]
async fn test_unread_events_do_not_block_outbound_frames() {
    let (mut link, mut upstream) = open().await;
    // Taken but never polled: the event queue fills up
    let _events = link.receive();

    for i in 0..(LINK_CHANNEL_CAPACITY + 64) {
        upstream
            .send_json(json!({"serverContent": {"parts": [{"text": format!("part {i}")}]}}))
            .await;
    }

    link.send_audio("AAAA").await.unwrap();
    link.send_tool_result("c9", EXTRACTION_FUNCTION_NAME, json!({"result": "success"}));

    let audio = upstream.next_json().await;
    assert_eq!(audio["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");
    let ack = upstream.next_json().await;
    assert_eq!(ack["toolResponse"]["functionResponses"][0]["id"], "c9");
}

#[tokio::test]
async fn test_server_ping_answered() {
    let (_link, mut upstream) = open().await;

    upstream
        .socket
        .send(Message::Ping(b"hb".to_vec().into()))
        .await
        .unwrap();

    let msg = timeout(STEP_TIMEOUT, upstream.socket.next())
        .await
        .expect("no pong")
        .expect("client closed")
        .expect("socket error");
    assert!(matches!(msg, Message::Pong(_)));
}

#[tokio::test]
async fn test_invalid_utf8_binary_is_malformed() {
    let (mut link, mut upstream) = open().await;
    let mut events = link.receive();

    upstream
        .socket
        .send(Message::Binary(vec![0xff, 0xfe, 0x00].into()))
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        Some(UpstreamEvent::Malformed(_))
    ));
}

#[tokio::test]
async fn test_server_close_ends_event_sequence() {
    let (mut link, mut upstream) = open().await;
    let mut events = link.receive();

    upstream.socket.close(None).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(UpstreamEvent::ConnectionClosed)
    );
    assert_eq!(next_event(&mut events).await, None);
    assert!(!link.is_connected());

    // Audio after the close is dropped, not an error
    link.send_audio("AAAA").await.unwrap();
}

#[tokio::test]
async fn test_link_close_closes_socket() {
    let (link, mut upstream) = open().await;

    link.close();
    link.close();
    assert!(link.is_closed());
    assert!(!link.is_connected());

    let msg = timeout(STEP_TIMEOUT, upstream.socket.next())
        .await
        .expect("socket stayed open");
    assert!(matches!(msg, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
}

#[tokio::test]
async fn test_second_receive_is_empty() {
    let (mut link, _upstream) = open().await;

    let _live = link.receive();
    let mut stale = link.receive();
    assert_eq!(next_event(&mut stale).await, None);
}
