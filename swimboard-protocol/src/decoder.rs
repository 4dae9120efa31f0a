//! The full byte-stream → [`TimingEvent`] decoder.

use std::collections::VecDeque;

use crate::capture::DebugRecorder;
use crate::frame::FrameSplitter;
use crate::message::{MessageDecoder, TimingEvent};

/// Lazy, unbounded, non-restartable decoder over a serial byte stream.
///
/// Push bytes in as they arrive, drain events out. Corrupt input never
/// poisons the decoder: bad frames are dropped and scanning continues at the
/// next start marker. With a capture sink attached, every raw frame (valid
/// or not) is recorded in arrival order before decoding is attempted.
#[derive(Default)]
pub struct FrameDecoder {
    splitter: FrameSplitter,
    messages: MessageDecoder,
    capture: Option<DebugRecorder>,
    ready: VecDeque<TimingEvent>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a debug-capture sink.
    pub fn with_capture(mut self, recorder: DebugRecorder) -> Self {
        self.capture = Some(recorder);
        self
    }

    /// Feed newly received bytes, decoding any frames they complete.
    pub fn push(&mut self, bytes: &[u8]) {
        self.splitter.push(bytes);
        while let Some(frame) = self.splitter.next_frame() {
            if let Some(recorder) = self.capture.as_mut() {
                recorder.record(&frame);
            }
            if let Some(event) = self.messages.accept(&frame) {
                self.ready.push_back(event);
            }
        }
    }

    /// Pop the next decoded event, if any.
    pub fn next_event(&mut self) -> Option<TimingEvent> {
        self.ready.pop_front()
    }
}
