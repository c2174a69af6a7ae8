//! WebSocket client for the OctoPrint push socket.
//!
//! [`StreamClient`] holds the socket URL and the auth payload. Each call
//! to [`StreamClient::connect`] opens a fresh connection and sends the
//! `{"auth": "<user>:<session>"}` frame before returning it.

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Path of the raw SockJS WebSocket endpoint.
pub const PUSH_SOCKET_PATH: &str = "/sockjs/websocket";

/// A live push-socket connection.
pub type PushSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Derive the push-socket URL from the controller's HTTP base URL.
///
/// `http` maps to `ws` and `https` to `wss`; a bare host is treated as
/// plain `ws`.
pub fn websocket_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{base}")
    };
    format!("{ws_base}{PUSH_SOCKET_PATH}")
}

/// Connection settings for the push socket.
#[derive(Debug, Clone)]
pub struct StreamClient {
    ws_url: String,
    auth: String,
}

impl StreamClient {
    /// * `base_url` - controller HTTP base URL, e.g. `http://octopi.local`.
    /// * `auth`     - `<user>:<session>` from a successful login.
    pub fn new(base_url: &str, auth: String) -> Self {
        Self {
            ws_url: websocket_url(base_url),
            auth,
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Open the socket and authenticate it.
    pub async fn connect(&self) -> Result<PushSocket, StreamError> {
        let (mut ws_stream, _response) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| {
                StreamError::Connection(format!("Failed to connect to {}: {e}", self.ws_url))
            })?;

        let auth = serde_json::json!({ "auth": self.auth }).to_string();
        ws_stream
            .send(Message::Text(auth))
            .await
            .map_err(|e| StreamError::Auth(e.to_string()))?;

        tracing::info!(url = %self.ws_url, "Push socket connected and authenticated");
        Ok(ws_stream)
    }
}

/// Errors from the push-socket client.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The auth frame could not be sent.
    #[error("Auth frame failed: {0}")]
    Auth(String),
}
