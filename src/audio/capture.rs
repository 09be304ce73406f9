//! Microphone capture via `cpal`.
//!
//! [`CpalBackend`] is the acquisition step: it answers whether the platform
//! can capture at all and hands out an [`AudioCapture`] for the configured
//! device.  [`AudioCapture::start`] begins streaming [`AudioChunk`]s into a
//! [`ChunkSender`]; the returned [`CaptureGuard`] is a RAII guard and dropping
//! it stops the underlying cpal stream.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring or running audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The platform has no audio capture capability at all.
    #[error("audio recording not supported")]
    UnsupportedCapture,

    /// Capture was started before a capture source was acquired.
    #[error("audio stream not initialized")]
    CaptureUnavailable,

    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to start capture uplink: {0}")]
    Uplink(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ChunkSender
// ---------------------------------------------------------------------------

/// Bounded, never-blocking hand-off from the audio thread.
///
/// When the consumer falls behind, chunks are dropped and counted instead of
/// stalling the hardware callback.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::SyncSender<AudioChunk>,
    overflow: Arc<AtomicU64>,
}

impl ChunkSender {
    /// Create a sender/receiver pair holding at most `backlog` chunks.
    pub fn bounded(backlog: usize) -> (Self, mpsc::Receiver<AudioChunk>) {
        Self::with_overflow_counter(backlog, Arc::new(AtomicU64::new(0)))
    }

    /// Like [`bounded`](Self::bounded), but overflow is added to `overflow`
    /// so the owner can watch it while capture runs.
    pub fn with_overflow_counter(
        backlog: usize,
        overflow: Arc<AtomicU64>,
    ) -> (Self, mpsc::Receiver<AudioChunk>) {
        let (tx, rx) = mpsc::sync_channel(backlog.max(1));
        (Self { tx, overflow }, rx)
    }

    /// Offer a chunk; returns `false` if it was dropped.
    pub fn offer(&self, chunk: AudioChunk) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(mpsc::TrySendError::Full(_)) => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Chunks dropped because the backlog was full.
    pub fn overflow(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// CaptureGuard
// ---------------------------------------------------------------------------

/// RAII guard that keeps a capture stream alive.
pub struct CaptureGuard {
    _stream: Box<dyn Any>,
}

impl CaptureGuard {
    /// Wrap whatever object keeps the stream running.
    pub fn new(stream: impl Any) -> Self {
        Self {
            _stream: Box::new(stream),
        }
    }
}

// ---------------------------------------------------------------------------
// Capture traits
// ---------------------------------------------------------------------------

/// A live audio source that has already been acquired.
pub trait CaptureSource {
    /// Start delivering chunks to `tx` until the guard is dropped.
    fn start(&self, tx: ChunkSender) -> Result<CaptureGuard, CaptureError>;

    /// Human-readable description for log lines.
    fn describe(&self) -> String;
}

/// Platform capability to acquire capture sources.
pub trait CaptureBackend {
    /// `false` when the platform cannot capture audio at all.
    fn is_supported(&self) -> bool;

    /// Acquire the configured capture source.
    fn acquire(&self) -> Result<Box<dyn CaptureSource>, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// [`CaptureBackend`] for the cpal default host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    /// Input device name; `None` selects the system default.
    pub device_name: Option<String>,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl CaptureBackend for CpalBackend {
    fn is_supported(&self) -> bool {
        cpal::default_host()
            .input_devices()
            .map(|mut devices| devices.next().is_some())
            .unwrap_or(false)
    }

    fn acquire(&self) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let capture = AudioCapture::open(self.device_name.as_deref())?;
        Ok(Box::new(capture))
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Open `device_name` on the default host, or the default input device
    /// when `None`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] / [`CaptureError::DeviceNotFound`] when the
    /// device is missing, [`CaptureError::DefaultConfig`] when it cannot
    /// report a stream configuration.
    pub fn open(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
        };

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_format,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn build<T>(&self, tx: ChunkSender) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.iter().map(|s| s.to_sample::<f32>()).collect(),
                    sample_rate,
                    channels,
                };
                tx.offer(chunk);
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;
        Ok(stream)
    }
}

impl CaptureSource for AudioCapture {
    fn start(&self, tx: ChunkSender) -> Result<CaptureGuard, CaptureError> {
        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build::<f32>(tx)?,
            cpal::SampleFormat::I16 => self.build::<i16>(tx)?,
            cpal::SampleFormat::U16 => self.build::<u16>(tx)?,
            other => return Err(CaptureError::UnsupportedSampleFormat(format!("{other:?}"))),
        };
        stream.play()?;
        Ok(CaptureGuard::new(stream))
    }

    fn describe(&self) -> String {
        let name = self.device.name().unwrap_or_else(|_| "unknown device".into());
        format!("{name} ({} Hz, {} ch)", self.sample_rate, self.channels)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
