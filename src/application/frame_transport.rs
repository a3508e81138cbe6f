// Transport traits for the streaming connection
use crate::domain::error::ConnectionError;
use async_trait::async_trait;

/// Opens links to the streaming endpoint.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn FrameLink>, ConnectionError>;
}

/// One open socket. Dropping it without `close` is allowed but not graceful.
#[async_trait]
pub trait FrameLink: Send {
    /// Next inbound text frame; `None` once the peer has closed the link.
    async fn next_frame(&mut self) -> Option<Result<String, ConnectionError>>;

    async fn send(&mut self, frame: String) -> Result<(), ConnectionError>;

    async fn close(&mut self) -> Result<(), ConnectionError>;
}
