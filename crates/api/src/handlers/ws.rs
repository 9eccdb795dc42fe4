//! Live run events over WebSocket.
//!
//! Each connection is one observer of the runner's broadcaster. Events are
//! sent as JSON text frames; incoming frames are ignored apart from close.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use engine::RunEvent;

use crate::AppState;

// GET /api/v1/ws
pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the upgrade completes so no event emitted in between is lost.
    let events = state.runner.broadcaster().subscribe();
    ws.on_upgrade(move |socket| forward(socket, events))
}

async fn forward(mut socket: WebSocket, mut events: broadcast::Receiver<RunEvent>) {
    info!("WebSocket observer connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to encode run event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket observer lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    info!("WebSocket observer disconnected");
}
