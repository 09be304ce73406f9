//! Connection manager — owns the single duplex socket.
//!
//! [`ConnectionManager`] is a cheap, cloneable handle.  All lifecycle work
//! happens in a driver task spawned by [`ConnectionManager::spawn`], which
//! feeds every socket event through [`transition`] and executes the returned
//! [`Action`]s.
//!
//! # Task layout
//!
//! ```text
//!             connect() / shutdown()            reconnect timer
//!                       │                             │
//!                       ▼                             ▼
//!                ┌──────────────────── driver ───────────────────┐
//!                │ state machine · socket generation · stats     │
//!                └──────┬──────────────────────────────┬─────────┘
//!                       │ spawns per socket            │ LinkEvent
//!            ┌──────────┴──────────┐                   ▼
//!       writer task            reader task        subscribers
//!   (mpsc → LinkWriter)   (LinkReader → decode)
//! ```
//!
//! [`ConnectionManager::send`] never awaits: it hands the encoded frame to
//! the writer task as one message, or fails with [`SendError::NotConnected`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{self, Frame};

use super::state::{transition, Action, ConnectionState, ConnectionStatus, Event};
use super::transport::{Connector, Link};

/// Fixed delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Encoded frames that may wait for the socket writer before `send` starts
/// refusing new ones.
pub const WRITE_BACKLOG: usize = 256;

// ---------------------------------------------------------------------------
// SendError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection is not Open; the frame was dropped.
    #[error("not connected")]
    NotConnected,

    /// The socket is Open but the writer is [`WRITE_BACKLOG`] frames behind;
    /// the frame was dropped.
    #[error("send backlog full")]
    Backlogged,
}

// ---------------------------------------------------------------------------
// FrameSender
// ---------------------------------------------------------------------------

/// Outbound side of the connection as seen by producers such as the capture
/// channel.
pub trait FrameSender: Send + Sync {
    /// `true` while frames can be written.
    fn is_open(&self) -> bool;

    /// Write one frame, or fail immediately without blocking.
    fn send(&self, frame: &Frame) -> Result<(), SendError>;
}

// ---------------------------------------------------------------------------
// LinkEvent
// ---------------------------------------------------------------------------

/// Everything the connection publishes, on a single ordered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Status(ConnectionStatus),
    Frame(Frame),
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ConnectionStats {
    connect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    frames_rejected: AtomicU64,
    frames_backlogged: AtomicU64,
    frames_received: AtomicU64,
    malformed_dropped: AtomicU64,
}

/// Point-in-time copy of the connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub connect_attempts: u64,
    /// Frames handed to the socket writer.
    pub frames_sent: u64,
    /// Frames refused with [`SendError::NotConnected`].
    pub frames_rejected: u64,
    /// Frames refused with [`SendError::Backlogged`].
    pub frames_backlogged: u64,
    pub frames_received: u64,
    /// Inbound messages dropped because they failed to decode.
    pub malformed_dropped: u64,
}

// ---------------------------------------------------------------------------
// Shared handle state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LinkSlot {
    state: ConnectionState,
    writer: Option<mpsc::Sender<Vec<u8>>>,
}

struct Shared {
    slot: Mutex<LinkSlot>,
    stats: ConnectionStats,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, LinkSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Messages delivered to the driver.
enum Input {
    /// Not tied to any socket: `connect()`, `shutdown()`, reconnect timer.
    Command(Event),
    /// Produced by the open attempt or the tasks of socket `generation`.
    Socket { generation: u64, event: Event },
    /// Open attempt `generation` succeeded.
    Opened { generation: u64, link: Link },
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Handle to the single logical connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
    inputs: mpsc::UnboundedSender<Input>,
}

impl ConnectionManager {
    /// Spawn the driver task and return a handle plus the inbound event
    /// stream.  Must be called from inside a tokio runtime.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called.
    pub fn spawn(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            slot: Mutex::new(LinkSlot::default()),
            stats: ConnectionStats::default(),
            driver: Mutex::new(None),
        });

        let driver = Driver {
            shared: Arc::clone(&shared),
            connector,
            url: url.into(),
            reconnect_delay,
            inputs_tx: inputs_tx.clone(),
            inputs: inputs_rx,
            events: events_tx,
            state: ConnectionState::Disconnected,
            generation: 0,
            pending_link: None,
            socket_tasks: Vec::new(),
            reconnect_timer: None,
        };
        let handle = tokio::spawn(driver.run());
        *shared.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        (
            Self {
                shared,
                inputs: inputs_tx,
            },
            events_rx,
        )
    }

    /// Request a connection.  A no-op while Connecting or Open.
    pub fn connect(&self) {
        let _ = self.inputs.send(Input::Command(Event::Connect));
    }

    /// Close the socket (if any), stop reconnecting and wait for the driver
    /// to exit.
    pub async fn shutdown(&self) {
        let _ = self.inputs.send(Input::Command(Event::Shutdown));
        let handle = self
            .shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("connection: driver task ended abnormally: {e}");
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.slot().state
    }

    pub fn stats(&self) -> ConnectionStatsSnapshot {
        let s = &self.shared.stats;
        ConnectionStatsSnapshot {
            connect_attempts: s.connect_attempts.load(Ordering::Relaxed),
            frames_sent: s.frames_sent.load(Ordering::Relaxed),
            frames_rejected: s.frames_rejected.load(Ordering::Relaxed),
            frames_backlogged: s.frames_backlogged.load(Ordering::Relaxed),
            frames_received: s.frames_received.load(Ordering::Relaxed),
            malformed_dropped: s.malformed_dropped.load(Ordering::Relaxed),
        }
    }
}

impl FrameSender for ConnectionManager {
    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn send(&self, frame: &Frame) -> Result<(), SendError> {
        let result = {
            let slot = self.shared.slot();
            match (&slot.state, &slot.writer) {
                (ConnectionState::Open, Some(writer)) => match writer.try_send(frame.encode()) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::Backlogged),
                    Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::NotConnected),
                },
                _ => Err(SendError::NotConnected),
            }
        };

        let stats = &self.shared.stats;
        let counter = match result {
            Ok(()) => &stats.frames_sent,
            Err(SendError::NotConnected) => &stats.frames_rejected,
            Err(SendError::Backlogged) => &stats.frames_backlogged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    url: String,
    reconnect_delay: Duration,
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs: mpsc::UnboundedReceiver<Input>,
    events: mpsc::UnboundedSender<LinkEvent>,
    state: ConnectionState,
    /// Incremented for every open attempt; events from older sockets are
    /// ignored.
    generation: u64,
    pending_link: Option<Link>,
    socket_tasks: Vec<JoinHandle<()>>,
    /// At most one reconnect timer is ever armed.
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self) {
        while let Some(input) = self.inputs.recv().await {
            let event = match input {
                Input::Command(event) => event,
                Input::Socket { generation, event } => {
                    if generation != self.generation {
                        log::debug!("connection: ignoring {event:?} from stale socket #{generation}");
                        continue;
                    }
                    event
                }
                Input::Opened { generation, link } => {
                    if generation != self.generation {
                        continue;
                    }
                    self.pending_link = Some(link);
                    Event::Opened
                }
            };

            if !self.apply(event) {
                break;
            }
        }

        self.cancel_reconnect();
        self.discard_socket();
        log::debug!("connection: driver stopped");
    }

    /// Returns `false` when the driver should stop.
    fn apply(&mut self, event: Event) -> bool {
        let t = transition(self.state, &event);
        if t.next != self.state {
            log::debug!(
                "connection: {} → {} on {event:?}",
                self.state.label(),
                t.next.label()
            );
        }
        self.state = t.next;

        let mut keep_running = true;
        for action in t.actions {
            match action {
                Action::OpenSocket => self.open_socket(),
                Action::ActivateSocket => self.activate_socket(),
                Action::CloseSocket => {
                    // Dropping the sender lets the writer task flush and close.
                    self.shared.slot().writer = None;
                }
                Action::DiscardSocket => self.discard_socket(),
                Action::Notify(status) => self.notify(status),
                Action::ScheduleReconnect => self.schedule_reconnect(),
                Action::Stop => keep_running = false,
            }
        }

        self.shared.slot().state = self.state;
        keep_running
    }

    fn open_socket(&mut self) {
        // An explicit connect() may beat the timer; the timer must not fire
        // on top of it.
        self.cancel_reconnect();
        self.generation += 1;
        self.shared
            .stats
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);
        log::info!("connection: connecting to {} (#{})", self.url, self.generation);

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let inputs = self.inputs_tx.clone();
        tokio::spawn(async move {
            let input = match connector.connect(&url).await {
                Ok(link) => Input::Opened { generation, link },
                Err(e) => Input::Socket {
                    generation,
                    event: Event::OpenFailed(e.to_string()),
                },
            };
            let _ = inputs.send(input);
        });
    }

    fn activate_socket(&mut self) {
        let Some(Link { mut writer, mut reader }) = self.pending_link.take() else {
            log::warn!("connection: no socket to activate");
            return;
        };
        let generation = self.generation;
        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(WRITE_BACKLOG);

        let inputs = self.inputs_tx.clone();
        let write_task = tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                if let Err(e) = writer.send(message).await {
                    let _ = inputs.send(Input::Socket {
                        generation,
                        event: Event::TransportError(e.to_string()),
                    });
                    return;
                }
            }
            if let Err(e) = writer.close().await {
                log::debug!("connection: close handshake failed: {e}");
            }
        });

        let inputs = self.inputs_tx.clone();
        let events = self.events.clone();
        let shared = Arc::clone(&self.shared);
        let read_task = tokio::spawn(async move {
            let event = loop {
                match reader.recv().await {
                    Some(Ok(bytes)) => {
                        shared.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                        match protocol::decode(&bytes) {
                            Ok(frame) => {
                                let _ = events.send(LinkEvent::Frame(frame));
                            }
                            Err(e) => {
                                shared
                                    .stats
                                    .malformed_dropped
                                    .fetch_add(1, Ordering::Relaxed);
                                log::warn!("connection: dropping inbound message: {e}");
                            }
                        }
                    }
                    Some(Err(e)) => break Event::TransportError(e.to_string()),
                    None => break Event::RemoteClosed,
                }
            };
            let _ = inputs.send(Input::Socket { generation, event });
        });

        self.shared.slot().writer = Some(writer_tx);
        self.socket_tasks.push(write_task);
        self.socket_tasks.push(read_task);
    }

    fn discard_socket(&mut self) {
        self.shared.slot().writer = None;
        self.pending_link = None;
        for task in self.socket_tasks.drain(..) {
            task.abort();
        }
    }

    fn notify(&self, status: ConnectionStatus) {
        match &status {
            ConnectionStatus::Connected => log::info!("connection: open"),
            ConnectionStatus::ConnectionFailed(reason) => {
                log::warn!("connection: attempt failed: {reason}")
            }
            ConnectionStatus::TransportError(reason) => {
                log::warn!("connection: transport error: {reason}")
            }
            ConnectionStatus::Disconnected => log::warn!("connection: closed"),
        }
        let _ = self.events.send(LinkEvent::Status(status));
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        let delay = self.reconnect_delay;
        log::info!("connection: reconnecting in {} ms", delay.as_millis());

        let inputs = self.inputs_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(Input::Command(Event::Connect));
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
