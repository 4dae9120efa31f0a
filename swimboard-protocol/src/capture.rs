//! Raw-frame debug capture.
//!
//! When enabled, every frame is appended to a JSONL file before decoding is
//! attempted, so a corrupted stream can be replayed and analyzed offline.
//! Capture failures disable the sink but must never interrupt decoding.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// One captured frame, hex-encoded with its arrival timestamps.
#[derive(Debug, Serialize)]
struct CaptureEntry {
    ts: String,
    ts_epoch: f64,
    byte_count: usize,
    data_hex: String,
}

/// Append-only JSONL sink for raw frames.
pub struct DebugRecorder {
    path: PathBuf,
    file: Option<File>,
}

impl DebugRecorder {
    /// Open the capture file for appending, creating parent directories.
    ///
    /// A recorder that fails to open logs a warning and stays disabled; the
    /// caller does not need to care.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %path.display(), error = %err,
                    "could not create directories for debug capture; disabling");
                return Self { path, file: None };
            }
        }

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                tracing::info!(path = %path.display(), "serial debug capture enabled");
                Self { path, file: Some(file) }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err,
                    "could not open debug capture file; disabling");
                Self { path, file: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one raw frame. Write failures disable the recorder.
    pub fn record(&mut self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let ts_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let entry = CaptureEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ts_epoch,
            byte_count: payload.len(),
            data_hex: hex_encode(payload),
        };

        let result = serde_json::to_string(&entry)
            .map_err(std::io::Error::other)
            .and_then(|line| {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
                file.flush()
            });

        if let Err(err) = result {
            tracing::warn!(path = %self.path.display(), error = %err,
                "failed to write serial debug entry; disabling capture");
            self.file = None;
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Decode the `data_hex` field of a capture entry.
pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_frames_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");

        let mut recorder = DebugRecorder::open(&path);
        assert!(recorder.is_enabled());
        recorder.record(&[0x01, 0x02, 0xff]);
        recorder.record(&[0x04]);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["byte_count"], 3);
        assert_eq!(entry["data_hex"], "0102ff");
        assert!(entry["ts_epoch"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn unwritable_path_disables_capture() {
        let mut recorder = DebugRecorder::open("/proc/does-not-exist/capture.jsonl");
        assert!(!recorder.is_enabled());
        // Recording on a disabled sink is a no-op, not an error.
        recorder.record(&[0x01]);
    }

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex_decode("0102ff").unwrap(), vec![0x01, 0x02, 0xff]);
        assert_eq!(hex_decode("0102f"), None);
        assert_eq!(hex_decode("zz"), None);
    }
}
