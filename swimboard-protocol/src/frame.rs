//! Byte-level framing for the timing controller's serial protocol.
//!
//! Frames are `[SOH] ... [EOT]` sequences. Anything outside those markers is
//! line noise and is skipped while resynchronizing.

/// Start of heading — first byte of every frame.
pub const SOH: u8 = 0x01;
/// Start of text.
pub const STX: u8 = 0x02;
/// End of transmission — frame terminator.
pub const EOT: u8 = 0x04;
/// Cursor-home control byte, part of the data-frame prefix.
pub const HOME: u8 = 0x08;
/// Line feed — marks the second part of a message pair.
pub const LF: u8 = 0x0A;
/// Device control 2, used by keep-alive frames.
pub const DC2: u8 = 0x12;
/// Device control 4, used by keep-alive frames.
pub const DC4: u8 = 0x14;

/// Upper bound on buffered bytes while waiting for a terminator.
const MAX_PENDING: usize = 256;
/// Tail kept when the pending buffer overflows without a terminator.
const KEEP_ON_OVERFLOW: usize = 64;

/// Splits a raw byte stream into `[SOH] ... [EOT]` frames.
///
/// Bytes that arrive before a start marker are discarded. A start marker with
/// no terminator in sight only ever buffers a bounded amount of data, so a
/// stuck or garbage stream cannot grow memory or stall the decoder.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, terminator included, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        // Resynchronize: drop everything up to the first start marker.
        match self.buf.iter().position(|&b| b == SOH) {
            Some(0) => {}
            Some(start) => {
                tracing::debug!(skipped = start, "discarding bytes while resynchronizing");
                self.buf.drain(..start);
            }
            None => {
                if !self.buf.is_empty() {
                    tracing::debug!(skipped = self.buf.len(), "discarding bytes while resynchronizing");
                    self.buf.clear();
                }
                return None;
            }
        }

        if let Some(end) = self.buf.iter().position(|&b| b == EOT) {
            let frame: Vec<u8> = self.buf.drain(..=end).collect();
            return Some(frame);
        }

        // No terminator yet: keep waiting, but never buffer unbounded data.
        if self.buf.len() > MAX_PENDING {
            tracing::warn!(
                buffered = self.buf.len(),
                "serial buffer overflow without terminator; truncating"
            );
            self.buf.drain(..self.buf.len() - KEEP_ON_OVERFLOW);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut f = vec![SOH];
        f.extend_from_slice(payload);
        f.push(EOT);
        f
    }

    #[test]
    fn splits_back_to_back_frames() {
        let mut splitter = FrameSplitter::new();
        let mut stream = frame(b"one");
        stream.extend(frame(b"two"));
        splitter.push(&stream);

        assert_eq!(splitter.next_frame().unwrap(), frame(b"one"));
        assert_eq!(splitter.next_frame().unwrap(), frame(b"two"));
        assert!(splitter.next_frame().is_none());
    }

    #[test]
    fn skips_noise_before_start_marker() {
        let mut splitter = FrameSplitter::new();
        splitter.push(b"\xff\xfe garbage");
        splitter.push(&frame(b"ok"));

        assert_eq!(splitter.next_frame().unwrap(), frame(b"ok"));
    }

    #[test]
    fn frame_split_across_pushes() {
        let mut splitter = FrameSplitter::new();
        let full = frame(b"partial");
        splitter.push(&full[..3]);
        assert!(splitter.next_frame().is_none());
        splitter.push(&full[3..]);
        assert_eq!(splitter.next_frame().unwrap(), full);
    }

    #[test]
    fn bounded_buffer_without_terminator() {
        let mut splitter = FrameSplitter::new();
        let mut junk = vec![SOH];
        junk.extend(std::iter::repeat(b'x').take(1000));
        splitter.push(&junk);

        assert!(splitter.next_frame().is_none());
        // A later valid frame is still recovered.
        splitter.push(&frame(b"later"));
        let got = splitter.next_frame().unwrap();
        assert_eq!(*got.last().unwrap(), EOT);
    }
}
