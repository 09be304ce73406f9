//! Audio devices — microphone capture, uplink sample encoding, and the
//! playback output context.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (bounded mpsc)
//!           → downmix_to_mono → encode_pcm16_le → AudioInput frame
//!
//! AudioSynthesizeResult payload → decode_wav (hound) → DecodedClip
//!           → SpeakerOutput (cpal output thread)
//! ```

pub mod capture;
pub mod output;
pub mod pcm;

pub use capture::{
    AudioCapture, AudioChunk, CaptureBackend, CaptureError, CaptureGuard, CaptureSource,
    ChunkSender, CpalBackend,
};
pub use output::{
    decode_wav, DecodedClip, OutputContext, OutputSlot, PlaybackError, SpeakerOutput,
};
pub use pcm::{downmix_to_mono, encode_pcm16_le, f32_to_i16};
