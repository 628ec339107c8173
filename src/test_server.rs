//! Scripted speech-to-text server for end-to-end tests.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::protocol::Envelope;

/// Maps an incoming event name to the frames the server answers with.
pub type Responder = fn(&str) -> Vec<Message>;

#[derive(Clone)]
struct ServerState {
    responder: Responder,
    /// Notified when a client close frame arrives.
    closes: Option<mpsc::UnboundedSender<()>>,
}

pub async fn spawn(responder: Responder) -> SocketAddr {
    serve(ServerState {
        responder,
        closes: None,
    })
    .await
}

/// Like `spawn`, also yielding one message per close frame received from a client.
pub async fn spawn_observed(responder: Responder) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr = serve(ServerState {
        responder,
        closes: Some(tx),
    })
    .await;
    (addr, rx)
}

async fn serve(state: ServerState) -> SocketAddr {
    let app = Router::new()
        .route("/", get(websocket_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => {
                if let Some(closes) = &state.closes {
                    let _ = closes.send(());
                }
                return;
            }
            _ => continue,
        };
        let Ok(envelope) = Envelope::parse(&text) else {
            continue;
        };
        for reply in (state.responder)(&envelope.event) {
            if socket.send(reply).await.is_err() {
                return;
            }
        }
    }
}

pub fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}

fn listening() -> Message {
    text(json!({"event": "notify_mic_listening", "data": {}}))
}

pub fn cooperative(event: &str) -> Vec<Message> {
    match event {
        "test" => vec![text(json!({"event": "test", "data": {"status": "ok"}}))],
        "calibrate_microphone" => vec![
            listening(),
            text(json!({"event": "calibrate_microphone", "data": {"success": true}})),
        ],
        "start_speech_to_text" => vec![
            listening(),
            text(json!({
                "event": "speech_to_text_result",
                "data": {"success": true, "transcription": "hello"}
            })),
        ],
        _ => vec![],
    }
}

pub fn mic_busy(event: &str) -> Vec<Message> {
    match event {
        "start_speech_to_text" => vec![text(json!({
            "event": "error_response",
            "data": {"errorMsg": "mic busy"}
        }))],
        other => cooperative(other),
    }
}

pub fn silent_on_speech(event: &str) -> Vec<Message> {
    match event {
        "start_speech_to_text" => vec![listening()],
        other => cooperative(other),
    }
}

/// Answers the liveness check with a frame that is not an envelope.
pub fn garbled_liveness(event: &str) -> Vec<Message> {
    match event {
        "test" => vec![Message::Text("this is not json".to_string())],
        other => cooperative(other),
    }
}

/// Binary noise, one text frame, then a close frame.
pub fn binary_then_close(_event: &str) -> Vec<Message> {
    vec![
        Message::Binary(vec![1, 2, 3]),
        text(json!({"event": "x"})),
        Message::Close(None),
    ]
}
