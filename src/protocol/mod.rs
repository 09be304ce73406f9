//! Binary wire protocol shared by both directions of the connection.

pub mod frame;

pub use frame::{decode, encode, Frame, FrameError, FrameKind};
