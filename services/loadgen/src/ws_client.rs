//! Virtual-user WebSocket client.
//!
//! Connects to the server's `/ws` endpoint with a bearer token already
//! attached to the handshake request; no further handshake frames are
//! exchanged client-side (the server sends an unsolicited
//! `channel_subscriptions` announcement once the connection is registered).

use chat_protocol::{decode, encode, Frame};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// An open chat session for one virtual user.
pub struct ChatSession {
    ws: WsStream,
}

impl ChatSession {
    /// Connects to `ws_url`, attaching `token` as a bearer `Authorization`
    /// header on the upgrade request.
    pub async fn connect(ws_url: &str, token: &str) -> Result<Self, SessionError> {
        use tokio_tungstenite::connect_async;

        let request = build_ws_request(ws_url, token)?;
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let text = encode(frame).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| SessionError::Ws(e.to_string()))
    }

    /// Waits for the next chat frame, transparently answering pings and
    /// skipping non-text frames. Returns `Ok(None)` on a clean close.
    pub async fn recv(&mut self) -> Result<Option<Frame>, SessionError> {
        loop {
            match self.ws.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(SessionError::Ws(e.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    let frame = decode(&text)
                        .map_err(|e| SessionError::Protocol(format!("decode: {e}")))?;
                    return Ok(Some(frame));
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.ws.send(Message::Pong(data)).await;
                    continue;
                }
                Some(Ok(_)) => {
                    debug!("ignoring non-text websocket frame");
                    continue;
                }
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.ws
            .close(None)
            .await
            .map_err(|e| SessionError::Ws(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Ws(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn build_ws_request(
    url: &str,
    token: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, SessionError> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| SessionError::Connect(format!("invalid URL '{url}': {e}")))?;

    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}").parse().map_err(
            |e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
                SessionError::Connect(format!("invalid auth header: {e}"))
            },
        )?,
    );

    Ok(request)
}
