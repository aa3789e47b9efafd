//! WebSocket handler for JSON-RPC communication.

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;

use super::WebState;
use crate::rpc::{Notification, Request, Response};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: WebState) {
    let mut events = state.handler.subscribe();

    loop {
        let outgoing = tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                };

                match serde_json::from_str::<Request>(text.as_str()) {
                    Ok(request) if request.is_notification() => {
                        state.handler.handle(request).await;
                        continue;
                    }
                    Ok(request) => serde_json::to_string(&state.handler.handle(request).await),
                    Err(e) => {
                        tracing::debug!(error = %e, "WebSocket parse error");
                        serde_json::to_string(&Response::parse_error())
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) => serde_json::to_string(&Notification::from_event(&event)),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        };

        let text = match outgoing {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize WebSocket message");
                continue;
            }
        };

        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }

    tracing::debug!("WebSocket connection closed");
}
