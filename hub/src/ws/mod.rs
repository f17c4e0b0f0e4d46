pub mod broadcast;
pub mod topics;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// `{"type": "subscribe" | "unsubscribe" | "ping", "topic": "optimize:<id>"}`
#[derive(Debug, Deserialize)]
struct WsClientMsg {
    #[serde(rename = "type")]
    msg_type: String,
    topic: Option<String>,
}

/// One forwarder task per subscribed topic on a connection.
#[derive(Default)]
struct Forwarders {
    handles: HashMap<String, JoinHandle<()>>,
}

impl Forwarders {
    /// Whether `topic` still has a running forwarder. A forwarder stops when
    /// its topic closes; its entry is dropped here so the topic can be
    /// subscribed again.
    fn is_active(&mut self, topic: &str) -> bool {
        match self.handles.get(topic) {
            Some(handle) if !handle.is_finished() => true,
            Some(_) => {
                self.handles.remove(topic);
                false
            }
            None => false,
        }
    }

    fn insert(&mut self, topic: String, handle: JoinHandle<()>) {
        if let Some(old) = self.handles.insert(topic, handle) {
            old.abort();
        }
    }

    fn remove(&mut self, topic: &str) {
        if let Some(handle) = self.handles.remove(topic) {
            handle.abort();
        }
    }

    fn abort_all(self) {
        for handle in self.handles.into_values() {
            handle.abort();
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let hub = &state.broadcast;

    let mut forwarders = Forwarders::default();
    let (tx_to_client, mut rx_to_client) = tokio::sync::mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx_to_client.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Ok(parsed) = serde_json::from_str::<WsClientMsg>(&text) else {
            continue;
        };

        match (parsed.msg_type.as_str(), parsed.topic) {
            ("subscribe", Some(topic)) if !forwarders.is_active(&topic) => {
                let mut sub_rx = hub.subscribe(&topic);
                let tx = tx_to_client.clone();
                let handle = tokio::spawn(async move {
                    loop {
                        match sub_rx.recv().await {
                            Ok(msg) => {
                                if tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::debug!(skipped, "ws subscriber lagged");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                });
                forwarders.insert(topic, handle);
            }
            ("unsubscribe", Some(topic)) => forwarders.remove(&topic),
            ("ping", _) => {
                let _ = tx_to_client.send(r#"{"type":"pong"}"#.to_string()).await;
            }
            _ => {}
        }
    }

    forwarders.abort_all();
    writer.abort();
}
