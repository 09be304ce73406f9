//! Capture channel — live microphone audio → AudioInput frames.
//!
//! ```text
//! CaptureBackend::acquire ──▶ CaptureSource (owned here)
//!
//! start():
//!   cpal callback ──ChunkSender (bounded)──▶ "capture-uplink" thread
//!                                              │ is_open()?  no → drop
//!                                              │ downmix → i16 LE → Frame
//!                                              ▼
//!                                         FrameSender::send
//! ```
//!
//! Capture never waits for the network.  Chunks produced while the
//! connection is not Open, or while its send backlog is full, are dropped and
//! counted; nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::{
    downmix_to_mono, encode_pcm16_le, AudioChunk, CaptureBackend, CaptureError, CaptureGuard,
    CaptureSource, ChunkSender,
};
use crate::connection::{FrameSender, SendError};
use crate::protocol::{Frame, FrameKind};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CaptureStats {
    chunks: AtomicU64,
    frames_sent: AtomicU64,
    dropped_not_open: AtomicU64,
    dropped_backlog: AtomicU64,
    /// Shared with the live `ChunkSender`, so it counts while capture runs.
    dropped_overflow: Arc<AtomicU64>,
}

/// Point-in-time copy of the capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    /// Chunks that reached the uplink.
    pub chunks: u64,
    pub frames_sent: u64,
    /// Chunks dropped because the connection was not Open.
    pub dropped_not_open: u64,
    /// Chunks dropped because the socket writer was too far behind.
    pub dropped_backlog: u64,
    /// Chunks dropped on the audio thread because the uplink fell behind.
    pub dropped_overflow: u64,
}

/// What happened to one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
    /// The chunk held no complete sample frame.
    Empty,
}

// ---------------------------------------------------------------------------
// Uplink
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Uplink {
    sender: Arc<dyn FrameSender>,
    stats: Arc<CaptureStats>,
}

impl Uplink {
    fn forward(&self, chunk: &AudioChunk) -> Delivery {
        self.stats.chunks.fetch_add(1, Ordering::Relaxed);

        if !self.sender.is_open() {
            self.stats.dropped_not_open.fetch_add(1, Ordering::Relaxed);
            return Delivery::Dropped;
        }

        let mono = downmix_to_mono(&chunk.samples, chunk.channels);
        if mono.is_empty() {
            return Delivery::Empty;
        }

        let frame = Frame::new(FrameKind::AudioInput, encode_pcm16_le(&mono));
        match self.sender.send(&frame) {
            Ok(()) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                Delivery::Sent
            }
            Err(SendError::Backlogged) => {
                self.stats.dropped_backlog.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(SendError::NotConnected) => {
                // Closed between the check and the write.
                self.stats.dropped_not_open.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureChannel
// ---------------------------------------------------------------------------

/// Owns the capture source and turns its chunks into outbound frames.
pub struct CaptureChannel {
    uplink: Uplink,
    source: Option<Box<dyn CaptureSource>>,
    backlog: usize,
}

impl CaptureChannel {
    /// `backlog` bounds the number of chunks buffered between the audio
    /// thread and the uplink.
    pub fn new(sender: Arc<dyn FrameSender>, backlog: usize) -> Self {
        Self {
            uplink: Uplink {
                sender,
                stats: Arc::new(CaptureStats::default()),
            },
            source: None,
            backlog,
        }
    }

    /// Acquire a capture source from `backend`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::UnsupportedCapture`] when the platform cannot capture,
    /// or whatever the backend reports while opening the device.
    pub fn acquire(&mut self, backend: &dyn CaptureBackend) -> Result<(), CaptureError> {
        if !backend.is_supported() {
            return Err(CaptureError::UnsupportedCapture);
        }
        let source = backend.acquire()?;
        log::info!("capture: acquired {}", source.describe());
        self.source = Some(source);
        Ok(())
    }

    pub fn is_acquired(&self) -> bool {
        self.source.is_some()
    }

    /// Start streaming the acquired source.
    ///
    /// # Errors
    ///
    /// [`CaptureError::CaptureUnavailable`] if [`acquire`](Self::acquire) has
    /// not succeeded yet.
    pub fn start(&self) -> Result<CaptureStream, CaptureError> {
        let source = self
            .source
            .as_ref()
            .ok_or(CaptureError::CaptureUnavailable)?;

        let (tx, rx) = ChunkSender::with_overflow_counter(
            self.backlog,
            Arc::clone(&self.uplink.stats.dropped_overflow),
        );
        let guard = source.start(tx)?;

        let uplink = self.uplink.clone();
        let worker = thread::Builder::new()
            .name("capture-uplink".into())
            .spawn(move || {
                while let Ok(chunk) = rx.recv() {
                    uplink.forward(&chunk);
                }
                log::info!("capture: track processor closed");
            })?;

        Ok(CaptureStream {
            guard: Some(guard),
            worker: Some(worker),
        })
    }

    /// Encode and send one chunk right now.  This is what the uplink thread
    /// runs for every captured chunk.
    pub fn forward(&self, chunk: &AudioChunk) -> Delivery {
        self.uplink.forward(chunk)
    }

    pub fn stats(&self) -> CaptureStatsSnapshot {
        let s = &self.uplink.stats;
        CaptureStatsSnapshot {
            chunks: s.chunks.load(Ordering::Relaxed),
            frames_sent: s.frames_sent.load(Ordering::Relaxed),
            dropped_not_open: s.dropped_not_open.load(Ordering::Relaxed),
            dropped_backlog: s.dropped_backlog.load(Ordering::Relaxed),
            dropped_overflow: s.dropped_overflow.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureStream
// ---------------------------------------------------------------------------

/// A running capture.  Dropping it (or calling [`stop`](Self::stop)) stops
/// the device stream and joins the uplink thread once it has drained.
pub struct CaptureStream {
    guard: Option<CaptureGuard>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.guard.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("capture: uplink thread panicked");
            }
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
