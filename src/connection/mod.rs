//! The single persistent connection to the voice service.
//!
//! * [`state`] — pure lifecycle state machine.
//! * [`transport`] — socket traits and the `tokio-tungstenite` implementation.
//! * [`manager`] — [`ConnectionManager`], the driver that ties them together
//!   and reconnects on a fixed delay.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cameron_client::connection::{
//!     ConnectionManager, LinkEvent, WsConnector, DEFAULT_RECONNECT_DELAY,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (manager, mut events) = ConnectionManager::spawn(
//!         "ws://127.0.0.1:8000/ws",
//!         Arc::new(WsConnector),
//!         DEFAULT_RECONNECT_DELAY,
//!     );
//!     manager.connect();
//!
//!     while let Some(event) = events.recv().await {
//!         if let LinkEvent::Frame(frame) = event {
//!             println!("{:?}: {} bytes", frame.kind, frame.payload.len());
//!         }
//!     }
//! }
//! ```

pub mod manager;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use manager::{
    ConnectionManager, ConnectionStatsSnapshot, FrameSender, LinkEvent, SendError,
    DEFAULT_RECONNECT_DELAY, WRITE_BACKLOG,
};
pub use state::{ConnectionState, ConnectionStatus};
pub use transport::{ConnectionError, Connector, Link, LinkReader, LinkWriter, WsConnector};
