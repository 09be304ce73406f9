//! Session statistics.
//!
//! [`SessionStats`] gathers the counters kept by the connection, capture and
//! playback components into one snapshot.  The binary logs
//! [`summary`](SessionStats::summary) on exit.

use crate::connection::ConnectionStatsSnapshot;

use super::capture::CaptureStatsSnapshot;
use super::playback::PlaybackStatsSnapshot;

/// Counters for one session, taken at a single point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub connection: ConnectionStatsSnapshot,
    pub capture: CaptureStatsSnapshot,
    /// `None` when playback was disabled.
    pub playback: Option<PlaybackStatsSnapshot>,
}

impl SessionStats {
    /// Audio chunks that never reached the wire, for any reason.
    ///
    /// ```
    /// use cameron_client::pipeline::{CaptureStatsSnapshot, SessionStats};
    ///
    /// let stats = SessionStats {
    ///     capture: CaptureStatsSnapshot {
    ///         dropped_not_open: 3,
    ///         dropped_backlog: 1,
    ///         dropped_overflow: 2,
    ///         ..Default::default()
    ///     },
    ///     ..Default::default()
    /// };
    /// assert_eq!(stats.chunks_dropped(), 6);
    /// ```
    pub fn chunks_dropped(&self) -> u64 {
        self.capture.dropped_not_open
            + self.capture.dropped_backlog
            + self.capture.dropped_overflow
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        let c = &self.connection;
        let mut line = format!(
            "connects={} frames_sent={} frames_backlogged={} frames_received={} \
             malformed={} chunks_captured={} chunks_dropped={}",
            c.connect_attempts,
            c.frames_sent,
            c.frames_backlogged,
            c.frames_received,
            c.malformed_dropped,
            self.capture.chunks,
            self.chunks_dropped(),
        );
        match &self.playback {
            Some(p) => line.push_str(&format!(
                " clips_played={} clips_discarded={} decode_failures={} play_failures={}",
                p.played, p.discarded, p.decode_failures, p.play_failures
            )),
            None => line.push_str(" playback=off"),
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
