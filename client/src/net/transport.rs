//! Transport seam between the connection manager and a websocket library.
//!
//! DESIGN
//! ======
//! The connection manager only needs "open", "send text", "receive text" and
//! "close". Keeping those behind [`Connector`] and [`Transport`] lets the
//! lifecycle and reconnect logic run against in-memory transports in tests,
//! while production uses `tokio-tungstenite`.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// Error raised by a [`Connector`] or [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The websocket handshake failed.
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    /// Reading or writing an open websocket failed.
    #[error("websocket I/O failed: {0}")]
    Io(Box<tokio_tungstenite::tungstenite::Error>),
}

/// An open, bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next text frame. `None` means the peer closed the connection.
    async fn recv_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection, ignoring errors.
    async fn close(&mut self);
}

/// Opens [`Transport`]s to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|error| TransportError::Connect(Box::new(error)))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| TransportError::Io(Box::new(error)))
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(error) => return Some(Err(TransportError::Io(Box::new(error)))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(bytes) => debug!(len = bytes.len(), "dropping binary frame"),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
