//! cameron-client — streams live microphone audio to a voice service over one
//! persistent WebSocket and plays back or prints what the service sends back.
//!
//! * [`protocol`] — the one-byte-tag binary frame format.
//! * [`connection`] — connection lifecycle and fixed-delay reconnection.
//! * [`audio`] — cpal capture/output devices, PCM encoding, WAV decoding.
//! * [`pipeline`] — capture uplink, inbound routing, ordered playback, and
//!   the [`Session`](pipeline::Session) that wires them together.
//! * [`config`] — TOML settings.

pub mod audio;
pub mod config;
pub mod connection;
pub mod pipeline;
pub mod protocol;
