use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::connection::{TransportConnector, TransportLink};
use crate::errors::TransportError;

/// Connector for `ws://` and `wss://` chat endpoints.
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl TransportConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::connect(url, format!("websocket handshake failed: {e}")))?;
        debug!(%url, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WebSocketLink {
            stream,
            closed: false,
        }))
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait::async_trait]
impl TransportLink for WebSocketLink {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "websocket close frame received");
                    return None;
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => continue,
                Err(err) => return Some(Err(TransportError::io(err.to_string()))),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::io(format!("websocket send failed: {e}")))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "websocket close after peer shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ReadyState};
    use crate::connection::tests::wait_for_status;
    use crate::frame::{Frame, decode_frame};
    use tokio::net::TcpListener;

    async fn echo_server() -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
            let mut received = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    WsMessage::Text(text) => {
                        received.push(text.clone());
                        let reply = serde_json::json!({"type": "final", "answer": format!("echo: {text}")});
                        ws.send(WsMessage::Text(reply.to_string()))
                            .await
                            .expect("reply");
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            received
        });
        (format!("ws://{addr}/ws/chat"), handle)
    }

    #[tokio::test]
    async fn round_trips_text_over_loopback() {
        let (url, server) = echo_server().await;
        let mut conn = Connection::new(WebSocketConnector, 8);
        let mut status = conn.watch_status();
        conn.set_url(Some(url)).await;
        wait_for_status(&mut status, ReadyState::Open).await;

        assert!(conn.send(r#"{"query":"hi"}"#));
        let reply = conn.next_message().await.expect("reply");
        let Frame::Final(answer) = decode_frame(&reply) else {
            panic!("expected final frame, got {reply}");
        };
        assert_eq!(answer.text, r#"echo: {"query":"hi"}"#);

        conn.close().await;
        assert_eq!(conn.status(), ReadyState::Closed);
        let received = server.await.expect("server task");
        assert_eq!(received, vec![r#"{"query":"hi"}"#.to_string()]);
    }

    #[tokio::test]
    async fn refused_connection_ends_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut conn = Connection::new(WebSocketConnector, 8);
        conn.set_url(Some(format!("ws://{addr}/ws/chat"))).await;
        assert_eq!(conn.next_message().await, None);
        assert_eq!(conn.status(), ReadyState::Closed);
    }
}
