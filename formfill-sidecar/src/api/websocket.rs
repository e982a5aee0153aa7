use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::state::AppState;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WsFilter {
    /// Only forward events of this replay
    pub session_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    Query(filter): Query<WsFilter>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request from client: {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, filter, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, filter: WsFilter, state: Arc<AppState>) {
    tracing::info!("WebSocket connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::channel::<()>(8);

    // Subscribe to replay events
    let mut rx = state.subscribe();

    // Forward replay events (and pongs) to this client
    let send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => {
                        if filter.session_id.as_deref().is_some_and(|id| id != event.session_id()) {
                            continue;
                        }
                        match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(_) => continue,
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged, {} events dropped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(()) = pong_rx.recv() => r#"{"type":"pong"}"#.to_string(),
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Answer pings
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(incoming) = serde_json::from_str::<WsIncoming>(&text) {
                    if incoming.msg_type == "ping" && pong_tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    tracing::info!("WebSocket disconnected: {}", client_id);
}
