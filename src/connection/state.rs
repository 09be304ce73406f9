//! Connection lifecycle state machine.
//!
//! [`transition`] is a pure function of `(state, event)`; it returns the next
//! state plus the [`Action`]s the driver must perform.  Keeping it free of I/O
//! lets the whole lifecycle be tested without a socket.
//!
//! ```text
//! Disconnected ──Connect──▶ Connecting ──Opened──▶ Open
//!      ▲                        │                   │
//!      │                   OpenFailed        RemoteClosed / TransportError
//!      │                        ▼                   ▼
//!      └──(reconnect timer)── Disconnected ◀────────┘
//!
//! Open ──Shutdown──▶ Closing ──RemoteClosed──▶ Disconnected (stop)
//! ```

/// Lifecycle of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket exists.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open and frames may be sent.
    Open,
    /// A local shutdown is in progress.
    Closing,
}

impl ConnectionState {
    /// A short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `connect()` was called, or the reconnect timer fired.
    Connect,
    /// The pending open attempt succeeded.
    Opened,
    /// The pending open attempt failed.
    OpenFailed(String),
    /// The remote end closed the socket (or the stream ended).
    RemoteClosed,
    /// Reading from or writing to the socket failed.
    TransportError(String),
    /// The owner asked for a clean stop.
    Shutdown,
}

/// Status notifications published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    ConnectionFailed(String),
    TransportError(String),
    Disconnected,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start a new open attempt.
    OpenSocket,
    /// Install the freshly opened socket as the live one.
    ActivateSocket,
    /// Begin a clean close of the live socket.
    CloseSocket,
    /// Drop the live socket and its tasks.
    DiscardSocket,
    /// Publish a status notification.
    Notify(ConnectionStatus),
    /// Arm the fixed-delay reconnect timer.
    ScheduleReconnect,
    /// Stop the driver loop.
    Stop,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub actions: Vec<Action>,
}

impl Transition {
    fn to(next: ConnectionState, actions: Vec<Action>) -> Self {
        Self { next, actions }
    }

    fn stay(state: ConnectionState) -> Self {
        Self::to(state, Vec::new())
    }
}

/// Apply `event` to `state`.
///
/// Events that make no sense in the current state are ignored, which is what
/// makes a second `connect()` while Connecting or Open a no-op.
pub fn transition(state: ConnectionState, event: &Event) -> Transition {
    use Action::*;
    use ConnectionState::*;

    match (state, event) {
        (Disconnected, Event::Connect) => Transition::to(Connecting, vec![OpenSocket]),
        (Disconnected, Event::Shutdown) => Transition::to(Disconnected, vec![Stop]),

        (Connecting, Event::Opened) => Transition::to(
            Open,
            vec![ActivateSocket, Notify(ConnectionStatus::Connected)],
        ),
        (Connecting, Event::OpenFailed(reason)) => Transition::to(
            Disconnected,
            vec![
                Notify(ConnectionStatus::ConnectionFailed(reason.clone())),
                ScheduleReconnect,
            ],
        ),
        // The open attempt cannot be cancelled; its outcome is handled in
        // Closing.
        (Connecting, Event::Shutdown) => Transition::stay(Closing),

        (Open, Event::RemoteClosed) => Transition::to(
            Disconnected,
            vec![
                DiscardSocket,
                Notify(ConnectionStatus::Disconnected),
                ScheduleReconnect,
            ],
        ),
        (Open, Event::TransportError(reason)) => Transition::to(
            Disconnected,
            vec![
                DiscardSocket,
                Notify(ConnectionStatus::TransportError(reason.clone())),
                Notify(ConnectionStatus::Disconnected),
                ScheduleReconnect,
            ],
        ),
        (Open, Event::Shutdown) => Transition::to(Closing, vec![CloseSocket]),

        (Closing, Event::Opened) => Transition::to(Closing, vec![ActivateSocket, CloseSocket]),
        (Closing, Event::OpenFailed(_)) => Transition::to(Disconnected, vec![Stop]),
        (Closing, Event::RemoteClosed | Event::TransportError(_)) => Transition::to(
            Disconnected,
            vec![DiscardSocket, Notify(ConnectionStatus::Disconnected), Stop],
        ),

        (state, _) => Transition::stay(state),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
