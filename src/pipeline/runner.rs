//! Session — wires the connection, capture, router and playback together.
//!
//! [`Session`] replaces any notion of global client state.  Each component
//! receives only the handle it needs:
//!
//! | Component        | Gets                                         |
//! |------------------|----------------------------------------------|
//! | `CaptureChannel` | `Arc<dyn FrameSender>` (the connection)      |
//! | `EventRouter`    | `Arc<dyn TextSink>`, `Option<PlaybackQueue>` |
//! | `PlaybackQueue`  | `OutputSlot` (read only), `Arc<dyn TextSink>`|
//!
//! # Event flow
//!
//! ```text
//! ConnectionManager ──LinkEvent──▶ Session::pump
//!                                   ├─ Status → text sink
//!                                   └─ Frame  → EventRouter::route
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::{CaptureBackend, OutputSlot};
use crate::config::AppConfig;
use crate::connection::{ConnectionManager, ConnectionStatus, Connector, LinkEvent};

use super::capture::{CaptureChannel, CaptureStream};
use super::playback::PlaybackQueue;
use super::router::EventRouter;
use super::sink::TextSink;
use super::state::SessionStats;

/// One running client session.
///
/// Must be created inside a tokio runtime: it spawns the connection driver
/// and, when an output slot is given, the playback drain worker.
pub struct Session {
    connection: ConnectionManager,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    router: EventRouter,
    capture: CaptureChannel,
    sink: Arc<dyn TextSink>,
}

impl Session {
    /// `output == None` disables playback entirely.
    pub fn new(
        config: &AppConfig,
        connector: Arc<dyn Connector>,
        output: Option<OutputSlot>,
        sink: Arc<dyn TextSink>,
    ) -> Self {
        let (connection, events) = ConnectionManager::spawn(
            config.endpoint_url(),
            connector,
            config.reconnect.delay(),
        );

        let playback = output.map(|slot| PlaybackQueue::spawn(slot, Arc::clone(&sink)));
        let router = EventRouter::new(Arc::clone(&sink), playback);
        let capture =
            CaptureChannel::new(Arc::new(connection.clone()), config.audio.chunk_backlog);

        Self {
            connection,
            events,
            router,
            capture,
            sink,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Open the connection.  Reconnection after that is automatic.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Acquire a capture source from `backend` and start streaming it.
    ///
    /// Capture failures are reported to the text sink and leave the rest of
    /// the session running; `None` means there is no live capture.
    pub fn start_capture(&mut self, backend: &dyn CaptureBackend) -> Option<CaptureStream> {
        if let Err(e) = self.capture.acquire(backend) {
            self.sink.error(&e.to_string());
            return None;
        }
        self.sink.info("audio recording is supported");

        match self.capture.start() {
            Ok(stream) => {
                self.sink.info("microphone stream started");
                Some(stream)
            }
            Err(e) => {
                self.sink.error(&e.to_string());
                None
            }
        }
    }

    /// Wait for and handle the next connection event.
    ///
    /// Returns `false` once the connection driver has gone away.
    pub async fn pump(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handle events until `shutdown` resolves.  The connection stays up;
    /// follow with [`close`](Self::close).
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("session: shutdown requested");
                    break;
                }
                alive = self.pump() => {
                    if !alive {
                        log::warn!("session: connection driver stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Close the connection for good and return the final counters.
    pub async fn close(&self) -> SessionStats {
        self.connection.shutdown().await;
        self.stats()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            connection: self.connection.stats(),
            capture: self.capture.stats(),
            playback: self.router.playback().map(PlaybackQueue::stats),
        }
    }

    fn handle(&self, event: LinkEvent) {
        match event {
            LinkEvent::Status(status) => self.report(status),
            LinkEvent::Frame(frame) => {
                self.router.route(frame);
            }
        }
    }

    fn report(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => self.sink.info("websocket connection opened"),
            ConnectionStatus::ConnectionFailed(reason) => self
                .sink
                .error(&format!("websocket connection failed: {reason}")),
            ConnectionStatus::TransportError(reason) => {
                self.sink.error(&format!("websocket error: {reason}"))
            }
            ConnectionStatus::Disconnected => self
                .sink
                .error("websocket connection closed, reconnecting..."),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
