// WebSocket transport - FrameTransport over tokio-tungstenite
use crate::application::frame_transport::{FrameLink, FrameTransport};
use crate::domain::error::ConnectionError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn FrameLink>, ConnectionError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameLink for WsLink {
    async fn next_frame(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ConnectionError::Transport(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!("Skipping non UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "Close frame received");
                    return None;
                }
                // Pings are answered by tungstenite on the next read or write.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}
