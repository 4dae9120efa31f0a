//! Serial timing-protocol decoder for the swimboard scoreboard.
//!
//! This crate turns the raw byte stream of a pool timing controller into
//! typed [`TimingEvent`]s. It owns:
//!
//! - framing and resynchronization over `[SOH] ... [EOT]` frames,
//! - part-1/part-2 message pairing and field parsing,
//! - `Hh:Mm:Ss.dc` time arithmetic (centisecond parsing, lap splits),
//! - the optional raw-frame debug capture sink (JSONL).
//!
//! Decoding is infallible from the caller's point of view: corrupt input is
//! dropped with a warning and the decoder resynchronizes on the next start
//! marker.

pub mod capture;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod message;
pub mod timefmt;

// Re-exports
pub use capture::DebugRecorder;
pub use decoder::FrameDecoder;
pub use error::{ProtocolError, Result};
pub use message::TimingEvent;
