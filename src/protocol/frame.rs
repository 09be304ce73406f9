//! Wire frame codec.
//!
//! Every WebSocket message in both directions is a single frame:
//!
//! ```text
//! ┌────────┬──────────────────────────┐
//! │ tag u8 │ payload (0..N bytes)     │
//! └────────┴──────────────────────────┘
//! ```
//!
//! The payload is opaque at this layer.  Tag values are part of the wire
//! contract and must never be renumbered.

use thiserror::Error;

// ---------------------------------------------------------------------------
// FrameError
// ---------------------------------------------------------------------------

/// Errors produced while decoding an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The message was empty, so there is no tag byte to read.
    #[error("malformed frame: message is empty")]
    MalformedFrame,
}

// ---------------------------------------------------------------------------
// FrameKind
// ---------------------------------------------------------------------------

/// Discriminator stored in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Client → server: signed 16-bit mono PCM samples.
    AudioInput,
    /// Server → client: UTF-8 transcription text.
    AudioTranscribeResult,
    /// Server → client: encoded audio bytes for playback.
    AudioSynthesizeResult,
    /// Server → client: UTF-8 model generation text.
    ModelGenerationResult,
    /// Any tag this client does not know.  Kept so newer servers can add
    /// frame kinds without breaking older clients.
    Unknown(u8),
}

impl FrameKind {
    /// The byte written on the wire for this kind.
    ///
    /// ```
    /// use cameron_client::protocol::FrameKind;
    ///
    /// assert_eq!(FrameKind::AudioInput.tag(), 0x01);
    /// assert_eq!(FrameKind::ModelGenerationResult.tag(), 0x04);
    /// assert_eq!(FrameKind::Unknown(0xFF).tag(), 0xFF);
    /// ```
    pub fn tag(self) -> u8 {
        match self {
            FrameKind::AudioInput => 0x01,
            FrameKind::AudioTranscribeResult => 0x02,
            FrameKind::AudioSynthesizeResult => 0x03,
            FrameKind::ModelGenerationResult => 0x04,
            FrameKind::Unknown(tag) => tag,
        }
    }

    /// Map a wire tag back to a kind.  Never fails.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x01 => FrameKind::AudioInput,
            0x02 => FrameKind::AudioTranscribeResult,
            0x03 => FrameKind::AudioSynthesizeResult,
            0x04 => FrameKind::ModelGenerationResult,
            other => FrameKind::Unknown(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One discrete tagged message unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Serialise this frame into a fresh wire buffer.
    pub fn encode(&self) -> Vec<u8> {
        encode(self.kind, &self.payload)
    }
}

// ---------------------------------------------------------------------------
// encode / decode
// ---------------------------------------------------------------------------

/// Prepend the tag for `kind` to `payload`.
///
/// The returned buffer is always exactly `payload.len() + 1` bytes long.
///
/// ```
/// use cameron_client::protocol::{encode, FrameKind};
///
/// let wire = encode(FrameKind::AudioInput, &[0x00, 0x01, 0x00, 0x02]);
/// assert_eq!(wire, vec![0x01, 0x00, 0x01, 0x00, 0x02]);
/// ```
pub fn encode(kind: FrameKind, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 1);
    buf.push(kind.tag());
    buf.extend_from_slice(payload);
    buf
}

/// Split a wire message into its kind and payload.
///
/// # Errors
///
/// Returns [`FrameError::MalformedFrame`] when `raw` is empty.  Unrecognised
/// tags are not an error; they decode to [`FrameKind::Unknown`].
pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
    let (&tag, payload) = raw.split_first().ok_or(FrameError::MalformedFrame)?;
    Ok(Frame {
        kind: FrameKind::from_tag(tag),
        payload: payload.to_vec(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
