//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::ConnectionHub;
use super::messages::{ClientMessage, ServerMessage};
use crate::api::AppState;
use crate::notify::ForegroundNotifier;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = state.hub.clone();
    let foreground = Arc::clone(&state.foreground);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, foreground))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: ConnectionHub, foreground: Arc<ForegroundNotifier>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.register(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register WebSocket connection");
            if let Some(msg) = encode(&ServerMessage::Error {
                message: e.to_string(),
            }) {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let connected = ServerMessage::Connected {
        connection_id: connection_id.clone(),
    };
    let delivered = match encode(&connected) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };
    if !delivered {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        hub.unregister(&connection_id).await;
        return;
    }

    let conn_id_for_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = hub.clone();
    let conn_id_for_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &foreground, &conn_id_for_recv, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
}

/// Handle a received WebSocket frame.
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(
    hub: &ConnectionHub,
    foreground: &ForegroundNotifier,
    connection_id: &str,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(hub, foreground, connection_id, client_msg).await;
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "Invalid client message"
                    );
                    let error_msg = ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    };
                    let _ = hub.send_to(connection_id, error_msg).await;
                }
            }
            true
        }
        Message::Binary(_) => {
            let error_msg = ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            };
            let _ = hub.send_to(connection_id, error_msg).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

async fn handle_client_message(
    hub: &ConnectionHub,
    foreground: &ForegroundNotifier,
    connection_id: &str,
    message: ClientMessage,
) {
    let reply = match message {
        ClientMessage::Subscribe { topics } => match hub.subscribe(connection_id, topics).await {
            Ok(topics) => Some(ServerMessage::Subscribed { topics }),
            Err(e) => Some(ServerMessage::Error {
                message: e.to_string(),
            }),
        },
        ClientMessage::Unsubscribe { topics } => {
            match hub.unsubscribe(connection_id, topics).await {
                Ok(topics) => Some(ServerMessage::Unsubscribed { topics }),
                Err(e) => Some(ServerMessage::Error {
                    message: e.to_string(),
                }),
            }
        }
        ClientMessage::NotificationClicked { tag } => {
            foreground.click(&tag, Some(connection_id)).await;
            None
        }
        ClientMessage::Ping => Some(ServerMessage::Pong),
    };

    if let Some(reply) = reply {
        let _ = hub.send_to(connection_id, reply).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::HubConfig;
    use std::time::Duration;

    async fn connected() -> (
        ConnectionHub,
        ForegroundNotifier,
        String,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let hub = ConnectionHub::new(HubConfig::default());
        let foreground = ForegroundNotifier::new(hub.clone(), Duration::from_secs(10));
        let (tx, rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();
        (hub, foreground, id, rx)
    }

    #[tokio::test]
    async fn test_subscribe_message_is_confirmed() {
        let (hub, foreground, id, mut rx) = connected().await;
        let frame = Message::Text(r#"{"type":"subscribe","topics":["feeds.*"]}"#.to_string());

        assert!(handle_ws_message(&hub, &foreground, &id, frame).await);
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::Subscribed { topics }) if topics == vec!["feeds.*"]
        ));
    }

    #[tokio::test]
    async fn test_invalid_message_keeps_connection() {
        let (hub, foreground, id, mut rx) = connected().await;
        let frame = Message::Text("not json".to_string());

        assert!(handle_ws_message(&hub, &foreground, &id, frame).await);
        assert!(matches!(rx.recv().await, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_click_focuses_reporting_dashboard() {
        let (hub, foreground, id, mut rx) = connected().await;
        let frame = Message::Text(r#"{"type":"notification_clicked","tag":"a1"}"#.to_string());

        assert!(handle_ws_message(&hub, &foreground, &id, frame).await);
        assert!(matches!(rx.recv().await, Some(ServerMessage::Focus { .. })));
    }

    #[tokio::test]
    async fn test_close_ends_connection() {
        let (hub, foreground, id, _rx) = connected().await;
        assert!(!handle_ws_message(&hub, &foreground, &id, Message::Close(None)).await);
    }
}
