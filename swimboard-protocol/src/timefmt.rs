//! Time-string arithmetic for the `Hh:Mm:Ss.dc` values on the wire.
//!
//! Leading components are optional: `"31.20"`, `"1:03.45"` and
//! `"1:02:03.40"` are all valid. Internally everything is centiseconds.

use crate::error::{ProtocolError, Result};

const CENTIS_PER_MINUTE: u64 = 60 * 100;
const CENTIS_PER_HOUR: u64 = 3600 * 100;

/// Parse a time string into centiseconds.
pub fn parse_centis(value: &str) -> Result<u64> {
    let text = value.trim();
    if text.is_empty() {
        return Err(ProtocolError::InvalidTime(value.to_string()));
    }

    let parts: Vec<&str> = text.split(':').collect();
    let (hours, minutes, sec_str) = match parts.as_slice() {
        [secs] => (0u64, 0u64, *secs),
        [mins, secs] => (0, parse_component(mins, value)?, *secs),
        [hours, mins, secs] => (parse_component(hours, value)?, parse_component(mins, value)?, *secs),
        _ => return Err(ProtocolError::InvalidTime(value.to_string())),
    };

    let seconds: f64 = sec_str
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidTime(value.to_string()))?;
    if seconds < 0.0 {
        return Err(ProtocolError::InvalidTime(value.to_string()));
    }

    let centis = (seconds * 100.0).round() as u64;
    Ok(centis + minutes * CENTIS_PER_MINUTE + hours * CENTIS_PER_HOUR)
}

fn parse_component(text: &str, original: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidTime(original.to_string()))
}

/// Format centiseconds back to a time string, omitting zero leading parts.
pub fn format_centis(centis: u64) -> String {
    let hours = centis / CENTIS_PER_HOUR;
    let rem = centis % CENTIS_PER_HOUR;
    let minutes = rem / CENTIS_PER_MINUTE;
    let rem = rem % CENTIS_PER_MINUTE;
    let seconds = rem / 100;
    let cc = rem % 100;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}.{cc:02}")
    } else if minutes > 0 {
        format!("{minutes}:{seconds:02}.{cc:02}")
    } else {
        format!("{seconds:02}.{cc:02}")
    }
}

/// Compute the split between two cumulative times.
///
/// Returns `None` when either time fails to parse or the difference is not
/// positive (out-of-order or duplicate touches).
pub fn split_between(earlier: &str, later: &str) -> Option<String> {
    let t0 = parse_centis(earlier).ok()?;
    let t1 = parse_centis(later).ok()?;
    if t1 <= t0 {
        return None;
    }
    Some(format_centis(t1 - t0))
}
