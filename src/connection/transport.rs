//! Duplex byte-message transport.
//!
//! The connection driver only needs three things from a socket: open it,
//! write one message, read the next message.  [`Connector`], [`LinkWriter`]
//! and [`LinkReader`] capture exactly that, so the driver can run against
//! the real WebSocket ([`WsConnector`]) or an in-memory double in tests.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

// ---------------------------------------------------------------------------
// ConnectionError
// ---------------------------------------------------------------------------

/// Transport-level failures.  None of them is fatal to the client: the
/// connection manager turns every one into a timed reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The socket could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An established socket failed while reading or writing.
    #[error("transport error: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Transport traits
// ---------------------------------------------------------------------------

/// Writing half of an open socket.
#[async_trait]
pub trait LinkWriter: Send {
    /// Write `message` as exactly one binary message.
    async fn send(&mut self, message: Vec<u8>) -> Result<(), ConnectionError>;

    /// Start a clean close handshake.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Reading half of an open socket.
#[async_trait]
pub trait LinkReader: Send {
    /// Next binary message, or `None` once the remote end has closed.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, ConnectionError>>;
}

/// An open socket split into its two halves.
pub struct Link {
    pub writer: Box<dyn LinkWriter>,
    pub reader: Box<dyn LinkReader>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens sockets to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = stream.split();
        Ok(Link {
            writer: Box::new(WsWriter { sink }),
            reader: Box::new(WsReader { stream }),
        })
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl LinkWriter for WsWriter {
    async fn send(&mut self, message: Vec<u8>) -> Result<(), ConnectionError> {
        self.sink
            .send(Message::Binary(message))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.sink
            .close()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl LinkReader for WsReader {
    async fn recv(&mut self) -> Option<Result<Vec<u8>, ConnectionError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                Ok(Message::Close(frame)) => {
                    log::debug!("connection: close frame received: {frame:?}");
                    return None;
                }
                Ok(Message::Text(text)) => {
                    // The protocol is binary-only.
                    log::debug!("connection: ignoring text message ({} bytes)", text.len());
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(ConnectionError::Transport(e.to_string()))),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_reason() {
        assert_eq!(
            ConnectionError::ConnectionFailed("refused".into()).to_string(),
            "connection failed: refused"
        );
        assert_eq!(
            ConnectionError::Transport("reset".into()).to_string(),
            "transport error: reset"
        );
    }

    #[test]
    fn connector_is_object_safe() {
        let _: Box<dyn Connector> = Box::new(WsConnector);
    }

    #[tokio::test]
    async fn connecting_to_a_closed_port_fails() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WsConnector
            .connect(&format!("ws://{addr}/ws"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionFailed(_)));
    }
}
