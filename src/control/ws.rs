//! Reply channel over WebSocket.
//!
//! On connect the client receives every pending interaction request, then
//! a live feed of coordinator events. Text frames from the client are
//! parsed as interaction replies.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::interaction::{InteractionRequest, InteractionResponse};

/// Server-originated messages that are not bus events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ServerMessage {
    Sync { requests: Vec<InteractionRequest> },
}

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<Coordinator>>,
) -> impl IntoResponse {
    info!("Reply channel client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, coordinator))
}

async fn sync_message(coordinator: &Coordinator) -> Option<Message> {
    let sync = ServerMessage::Sync {
        requests: coordinator.pending_interactions().await,
    };
    serde_json::to_string(&sync)
        .ok()
        .map(|json| Message::Text(json.into()))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<Coordinator>) {
    // Subscribe before the sync so nothing raised in between is missed.
    let mut rx = coordinator.subscribe();
    let (mut sender, mut receiver) = socket.split();

    if let Some(msg) = sync_message(&coordinator).await {
        if sender.send(msg).await.is_err() {
            warn!("Failed to send initial sync, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Reply channel client lagged behind event bus");
                        if let Some(msg) = sync_message(&coordinator).await {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed");
                        break;
                    }
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &coordinator).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Reply channel client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Reply channel connection closed");
}

async fn handle_client_message(text: &str, coordinator: &Coordinator) {
    match serde_json::from_str::<InteractionResponse>(text) {
        Ok(response) => {
            let request_id = response.request_id.clone();
            let outcome = coordinator.respond(response).await;
            debug!(request_id = %request_id, outcome = ?outcome, "Reply received over WS");
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}
