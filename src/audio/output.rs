//! Audio output context: decode synthesized clips and play them.
//!
//! [`OutputContext`] is what the playback queue talks to.  The production
//! implementation, [`SpeakerOutput`], decodes WAV payloads with `hound` on the
//! blocking pool and plays them through a cpal output stream owned by a
//! dedicated thread (cpal streams are not `Send` on every platform).
//!
//! [`OutputSlot`] holds the currently installed context.  The setup code owns
//! it; the playback queue only reads it, and treats an empty slot as a
//! torn-down output.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The clip bytes are not valid audio.
    #[error("failed to decode audio: {0}")]
    DecodeError(String),

    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    #[error("audio output stream error: {0}")]
    Stream(String),

    /// The output thread has exited.
    #[error("audio output closed")]
    OutputClosed,
}

// ---------------------------------------------------------------------------
// DecodedClip
// ---------------------------------------------------------------------------

/// A decoded, playable clip.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedClip {
    /// Real playback length of the clip.
    ///
    /// ```
    /// use cameron_client::audio::DecodedClip;
    /// use std::time::Duration;
    ///
    /// let clip = DecodedClip { samples: vec![0.0; 48_000], sample_rate: 24_000, channels: 2 };
    /// assert_eq!(clip.duration(), Duration::from_secs(1));
    /// ```
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// Decode a WAV container into a [`DecodedClip`].
///
/// Integer samples of any bit depth hound supports are normalised to
/// `[-1.0, 1.0]`; float samples are passed through.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedClip, PlaybackError> {
    let decode_err = |e: hound::Error| PlaybackError::DecodeError(e.to_string());

    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(decode_err)?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(PlaybackError::DecodeError(format!(
            "invalid format: {} ch @ {} Hz",
            spec.channels, spec.sample_rate
        )));
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode_err)?
        }
    };

    Ok(DecodedClip {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

// ---------------------------------------------------------------------------
// OutputContext
// ---------------------------------------------------------------------------

/// Decoding and playback device used by the playback queue.
#[async_trait]
pub trait OutputContext: Send + Sync {
    /// Decode encoded clip bytes into a playable buffer.
    async fn decode(&self, bytes: Vec<u8>) -> Result<DecodedClip, PlaybackError>;

    /// Start playing `clip` and return once it has started, without waiting
    /// for it to finish.  Fails if the device could not take the clip.
    async fn play(&self, clip: DecodedClip) -> Result<(), PlaybackError>;
}

// ---------------------------------------------------------------------------
// OutputSlot
// ---------------------------------------------------------------------------

/// Shared slot holding the active [`OutputContext`], if any.
#[derive(Clone, Default)]
pub struct OutputSlot {
    inner: Arc<RwLock<Option<Arc<dyn OutputContext>>>>,
}

impl OutputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, context: Arc<dyn OutputContext>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(context);
    }

    /// Remove the active context; in-flight clips finish on their own.
    pub fn teardown(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn current(&self) -> Option<Arc<dyn OutputContext>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// SpeakerOutput
// ---------------------------------------------------------------------------

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

/// A clip handed to the output thread, with a reply for whether it started.
type PlayRequest = (DecodedClip, oneshot::Sender<Result<(), PlaybackError>>);

/// cpal-backed [`OutputContext`].
pub struct SpeakerOutput {
    clips: mpsc::Sender<PlayRequest>,
}

impl SpeakerOutput {
    /// Open `device_name` (or the default output device) on a dedicated
    /// playback thread.
    pub fn open(device_name: Option<String>) -> Result<Self, PlaybackError> {
        let (clips_tx, clips_rx) = mpsc::channel::<PlayRequest>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, PlaybackError>>();

        thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let device = match find_output_device(device_name.as_deref()) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let name = device.name().unwrap_or_else(|_| "unknown device".into());
                let _ = ready_tx.send(Ok(name));
                run_output_thread(&device, clips_rx);
            })
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        let name = ready_rx
            .recv()
            .map_err(|_| PlaybackError::OutputClosed)??;
        log::info!("playback: output device {name}");

        Ok(Self { clips: clips_tx })
    }
}

#[async_trait]
impl OutputContext for SpeakerOutput {
    async fn decode(&self, bytes: Vec<u8>) -> Result<DecodedClip, PlaybackError> {
        tokio::task::spawn_blocking(move || decode_wav(&bytes))
            .await
            .map_err(|e| PlaybackError::DecodeError(format!("decode task failed: {e}")))?
    }

    async fn play(&self, clip: DecodedClip) -> Result<(), PlaybackError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.clips
            .send((clip, reply_tx))
            .map_err(|_| PlaybackError::OutputClosed)?;
        reply_rx.await.map_err(|_| PlaybackError::OutputClosed)?
    }
}

fn find_output_device(name: Option<&str>) -> Result<cpal::Device, PlaybackError> {
    let host = cpal::default_host();
    match name {
        None => host.default_output_device().ok_or(PlaybackError::NoDevice),
        Some(name) => host
            .output_devices()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| PlaybackError::DeviceNotFound(name.to_string())),
    }
}

/// Owns the cpal stream.  The stream is rebuilt whenever a clip arrives with
/// a different rate or channel count, so clips play at their native format.
/// Every request is answered: `Ok` once the samples are queued on a running
/// stream, or the error that kept the stream from starting.
fn run_output_thread(device: &cpal::Device, clips: mpsc::Receiver<PlayRequest>) {
    let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
    let mut active: Option<((u16, u32), cpal::Stream)> = None;

    while let Ok((clip, reply)) = clips.recv() {
        let format = (clip.channels, clip.sample_rate);
        if active.as_ref().map(|(f, _)| *f) != Some(format) {
            active = None;
            // Leftovers were rendered for the old format.
            queue.lock().unwrap_or_else(PoisonError::into_inner).clear();
            match build_output_stream(device, format, Arc::clone(&queue)) {
                Ok(stream) => active = Some((format, stream)),
                Err(e) => {
                    log::error!("playback: {e}");
                    let _ = reply.send(Err(e));
                    continue;
                }
            }
        }
        queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(clip.samples);
        let _ = reply.send(Ok(()));
    }

    log::debug!("playback: output thread exiting");
}

fn build_output_stream(
    device: &cpal::Device,
    (channels, sample_rate): (u16, u32),
    queue: SampleQueue,
) -> Result<cpal::Stream, PlaybackError> {
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                for sample in data.iter_mut() {
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
            },
            |err: cpal::StreamError| log::error!("playback: cpal stream error: {err}"),
            None,
        )
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    stream
        .play()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Build a 16-bit PCM WAV file of `frames` silent frames.
#[cfg(test)]
pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames * channels as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
