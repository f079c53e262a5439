use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::ClientError;
use crate::server::api::LiveMessage;

/// WebSocket URL of the overview feed, or of one list's feed.
pub fn live_url(server_url: &str, list_id: Option<Uuid>) -> String {
    let base = server_url
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    match list_id {
        Some(id) => format!("{}/live/lists/{}", base, id),
        None => format!("{}/live/lists", base),
    }
}

/// A connected `/live` socket.
pub struct LiveStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LiveStream {
    pub async fn connect(url: &str, token: &str) -> Result<Self, ClientError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::WebSocket(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::WebSocket(e.to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))?;
        Ok(Self { socket })
    }

    /// Next frame from the server. `None` once the socket is closed.
    pub async fn next(&mut self) -> Option<Result<LiveMessage, ClientError>> {
        loop {
            let frame = match self.socket.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(ClientError::WebSocket(e.to_string()))),
            };
            match frame {
                Message::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).map_err(ClientError::from))
                }
                Message::Ping(data) => {
                    let _ = self.socket.send(Message::Pong(data)).await;
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_url() {
        assert_eq!(
            live_url("http://localhost:8080/", None),
            "ws://localhost:8080/live/lists"
        );

        let id = Uuid::nil();
        assert_eq!(
            live_url("https://lists.example.com", Some(id)),
            format!("wss://lists.example.com/live/lists/{}", id)
        );
    }
}
