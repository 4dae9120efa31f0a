//! Reference serial bridge for the swimboard server.
//!
//! Streams raw bytes from the timing controller's serial device to stdout,
//! where the supervising server decodes them. Doubles as the replay tool
//! for debug-capture logs, preserving the original inter-frame gaps.
//!
//! The device is expected to be configured out of band (`stty` or udev);
//! `--settings` is validated and logged so misconfiguration shows up early.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use swimboard_protocol::capture::hex_decode;
use swimboard_server::config::{SerialSettings, DEFAULT_COM_SETTINGS};

#[derive(Debug, Parser)]
#[command(name = "swimboard-listener", version, about = "Serial bridge / capture replay")]
struct Args {
    /// Serial device to read, e.g. /dev/ttyUSB0.
    #[arg(long)]
    port: Option<PathBuf>,

    /// Serial settings as baud,data bits,parity,stop bits.
    #[arg(long, default_value = DEFAULT_COM_SETTINGS)]
    settings: String,

    /// Replay a debug-capture JSONL log instead of reading a device.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay speed multiplier for log timestamps.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Disable timing gaps between replayed log entries.
    #[arg(long)]
    no_sleep: bool,
}

/// One line of a debug-capture log; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct CaptureEntry {
    ts_epoch: Option<f64>,
    data_hex: String,
}

fn main() -> Result<()> {
    // stdout is the data channel; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Some(log_path) = args.replay {
        return replay(&log_path, args.speed, args.no_sleep);
    }

    let Some(port) = args.port else {
        bail!("either --port or --replay is required");
    };
    let settings: SerialSettings = args
        .settings
        .parse()
        .with_context(|| format!("invalid --settings {:?}", args.settings))?;

    stream_device(&port, settings)
}

fn stream_device(port: &PathBuf, settings: SerialSettings) -> Result<()> {
    let mut device = File::open(port)
        .with_context(|| format!("could not open serial device {}", port.display()))?;
    info!(port = %port.display(), %settings, "serial device opened; bridging to stdout");

    let mut stdout = std::io::stdout().lock();
    let mut buf = [0u8; 512];
    loop {
        let n = device
            .read(&mut buf)
            .with_context(|| format!("read error on {}", port.display()))?;
        if n == 0 {
            info!("serial device closed");
            return Ok(());
        }
        stdout.write_all(&buf[..n]).context("stdout write failed")?;
        stdout.flush().context("stdout flush failed")?;
    }
}

fn replay(log_path: &PathBuf, speed: f64, no_sleep: bool) -> Result<()> {
    let file = File::open(log_path)
        .with_context(|| format!("log file not found: {}", log_path.display()))?;
    info!(log = %log_path.display(), speed, "replaying capture log to stdout");

    let mut stdout = std::io::stdout().lock();
    let mut last_ts: Option<f64> = None;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("failed to read log line")?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: CaptureEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(line = line_no + 1, error = %err, "skipping invalid log entry");
                continue;
            }
        };
        let Some(payload) = hex_decode(&entry.data_hex) else {
            warn!(line = line_no + 1, "skipping entry with invalid hex payload");
            continue;
        };
        if payload.is_empty() {
            continue;
        }

        if !no_sleep {
            if let (Some(current), Some(last)) = (entry.ts_epoch, last_ts) {
                let delta = ((current - last) / speed.max(1e-6)).max(0.0);
                if delta > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(delta));
                }
            }
            last_ts = entry.ts_epoch.or(last_ts);
        }

        stdout.write_all(&payload).context("stdout write failed")?;
        stdout.flush().context("stdout flush failed")?;
    }

    Ok(())
}
