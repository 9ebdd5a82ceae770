use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::{AppState, OUTBOUND_QUEUE_CAPACITY};
use crate::{auth, hub, repo};

/// RFC 6455 policy-violation close code, used when the upgraded socket's
/// bearer token turns out to be missing, invalid, or disabled.
const POLICY_VIOLATION: u16 = 1008;

pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, headers, socket))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth::extract_bearer(raw)?;
    let username = state.auth.validate(token)?;
    match repo::users::credentials(&state.pool, &username).await {
        Ok(Some(creds)) if !creds.disabled => Some(username),
        _ => None,
    }
}

async fn handle_socket(state: AppState, headers: HeaderMap, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    let username = match authenticate(&state, &headers).await {
        Some(username) => username,
        None => {
            warn!("websocket upgrade had no valid bearer token, closing");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: POLICY_VIOLATION,
                    reason: "missing or invalid bearer token".into(),
                })))
                .await;
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);

    if let Err(err) = hub::handshake(&state, &username, outbound_tx).await {
        warn!(%username, %err, "handshake failed");
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || is_close {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => hub::dispatch(&state, &username, &text).await,
            Message::Binary(bytes) => {
                if let Ok(text) = String::from_utf8(bytes) {
                    hub::dispatch(&state, &username, &text).await;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    send_task.abort();
    hub::disconnect(&state, &username).await;
    info!(%username, "websocket connection closed");
}
