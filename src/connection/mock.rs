//! In-memory [`Connector`] used by unit tests across the crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{ConnectionError, Connector, Link, LinkReader, LinkWriter};

type RemoteTx = mpsc::UnboundedSender<Result<Vec<u8>, ConnectionError>>;

/// How every connect attempt behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockMode {
    /// Every attempt fails immediately.
    Refuse,
    /// Every attempt succeeds with a fresh in-memory link.
    Accept,
    /// Every attempt stays pending forever.
    Hang,
}

/// Observable side of the fake network.
#[derive(Default)]
pub(crate) struct MockWire {
    attempts: Mutex<Vec<Instant>>,
    written: Mutex<Vec<Vec<u8>>>,
    closes: AtomicUsize,
    remote: Mutex<Option<RemoteTx>>,
}

impl MockWire {
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Deliver `bytes` to the client as if the server had sent them.
    pub(crate) fn push_inbound(&self, bytes: Vec<u8>) -> bool {
        match self.remote.lock().unwrap().as_ref() {
            Some(tx) => tx.send(Ok(bytes)).is_ok(),
            None => false,
        }
    }

    /// Simulate the server closing the socket.
    pub(crate) fn close_remote(&self) {
        self.remote.lock().unwrap().take();
    }

    /// Simulate a transport failure on the read side.
    pub(crate) fn fail_remote(&self, reason: &str) {
        if let Some(tx) = self.remote.lock().unwrap().take() {
            let _ = tx.send(Err(ConnectionError::Transport(reason.into())));
        }
    }
}

pub(crate) struct MockConnector {
    mode: MockMode,
    wire: Arc<MockWire>,
}

impl MockConnector {
    pub(crate) fn new(mode: MockMode) -> (Arc<Self>, Arc<MockWire>) {
        let wire = Arc::new(MockWire::default());
        let connector = Arc::new(Self {
            mode,
            wire: Arc::clone(&wire),
        });
        (connector, wire)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Link, ConnectionError> {
        self.wire.attempts.lock().unwrap().push(Instant::now());
        match self.mode {
            MockMode::Refuse => Err(ConnectionError::ConnectionFailed("refused".into())),
            MockMode::Hang => std::future::pending().await,
            MockMode::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                *self.wire.remote.lock().unwrap() = Some(tx);
                Ok(Link {
                    writer: Box::new(MockWriter {
                        wire: Arc::clone(&self.wire),
                    }),
                    reader: Box::new(MockReader { rx }),
                })
            }
        }
    }
}

struct MockWriter {
    wire: Arc<MockWire>,
}

#[async_trait]
impl LinkWriter for MockWriter {
    async fn send(&mut self, message: Vec<u8>) -> Result<(), ConnectionError> {
        self.wire.written.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.wire.closes.fetch_add(1, Ordering::SeqCst);
        // The fake server acknowledges the close straight away.
        self.wire.close_remote();
        Ok(())
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>, ConnectionError>>,
}

#[async_trait]
impl LinkReader for MockReader {
    async fn recv(&mut self) -> Option<Result<Vec<u8>, ConnectionError>> {
        self.rx.recv().await
    }
}
