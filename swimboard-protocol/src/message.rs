//! Frame classification, message pairing and field parsing.
//!
//! The controller sends every timing message as a pair of data frames:
//!
//! ```text
//! part 1: [SOH][STX][HOME] A B C DD EE FFF GG ~~ HH          [EOT]   (20 bytes)
//! part 2: [SOH][STX][HOME] [LF] J KK [STX] Hh:Mm:Ss.dc ~     [EOT]   (21 bytes)
//! ```
//!
//! where `~` is a space. Part 1 carries the message type (`A`), time kind
//! (`B`), event (`FFF`), heat (`GG`) and rank (`HH`); part 2 carries the lane
//! (`J`), the current lap (`KK`) and the time string. Keep-alive frames
//! (`[SOH][DC2]9[DC4]TP[EOT]`) are interleaved and carry no data.

use crate::error::{ProtocolError, Result};
use crate::frame::{DC2, DC4, EOT, HOME, LF, SOH, STX};

/// Prefix shared by both parts of a data frame.
pub const DATA_PREFIX: [u8; 3] = [SOH, STX, HOME];
/// Keep-alive frame, sent periodically by the controller.
pub const ALIVE_FRAME: [u8; 7] = [SOH, DC2, b'9', DC4, b'T', b'P', EOT];

const PART1_PAYLOAD_LEN: usize = 16;
const PART2_PAYLOAD_LEN: usize = 17;

/// One decoded unit of timing input, consumed immediately by the state
/// engine and never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingEvent {
    /// Ready-at-start: the controller armed a new heat (heat boundary).
    HeatReady { event: u32, heat: u32 },
    /// Start signal fired; the race clock is running.
    RaceStart,
    /// A split or finish time for one lane.
    LaneTime {
        event: u32,
        heat: u32,
        lane: u8,
        lap: u32,
        rank: u32,
        time: String,
        finished: bool,
    },
    /// Official end of the current heat.
    HeatEnd,
}

enum FrameKind<'a> {
    Alive,
    Part1(&'a [u8]),
    Part2(&'a [u8]),
    Unknown,
}

fn classify(frame: &[u8]) -> FrameKind<'_> {
    if frame == ALIVE_FRAME {
        return FrameKind::Alive;
    }
    if frame.len() > DATA_PREFIX.len() + 1
        && frame.starts_with(&DATA_PREFIX)
        && frame.ends_with(&[EOT])
    {
        let payload = &frame[DATA_PREFIX.len()..frame.len() - 1];
        if payload.first() == Some(&LF) {
            return FrameKind::Part2(payload);
        }
        return FrameKind::Part1(payload);
    }
    FrameKind::Unknown
}

fn ascii_field<'a>(payload: &'a [u8], range: std::ops::Range<usize>, field: &'static str) -> Result<&'a str> {
    let bytes = payload
        .get(range)
        .ok_or(ProtocolError::MalformedFrame("payload too short"))?;
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::BadField {
        field,
        value: format!("{bytes:?}"),
    })
}

fn num_field(payload: &[u8], range: std::ops::Range<usize>, field: &'static str) -> Result<u32> {
    let text = ascii_field(payload, range, field)?;
    text.trim().parse().map_err(|_| ProtocolError::BadField {
        field,
        value: text.to_string(),
    })
}

/// Assembles part-1/part-2 pairs and decodes them into [`TimingEvent`]s.
///
/// Pairing follows the controller's quirks: a fresh part 1 replaces any
/// unmatched one, and a part 2 without a pending part 1 is discarded. Frames
/// that fail structural or field validation are dropped with a warning and
/// decoding continues with the next frame.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    pending_part1: Option<Vec<u8>>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one complete frame; returns an event when a pair completes.
    pub fn accept(&mut self, frame: &[u8]) -> Option<TimingEvent> {
        match classify(frame) {
            FrameKind::Alive => None,
            FrameKind::Unknown => {
                tracing::warn!(frame = ?frame, "unknown serial frame");
                None
            }
            FrameKind::Part1(payload) => {
                if payload.len() != PART1_PAYLOAD_LEN {
                    tracing::warn!(len = payload.len(), "part-1 frame with unexpected length");
                    return None;
                }
                if self.pending_part1.is_some() {
                    tracing::warn!("dropping unmatched part 1 before storing a new one");
                }
                self.pending_part1 = Some(payload.to_vec());
                None
            }
            FrameKind::Part2(payload) => {
                if payload.len() != PART2_PAYLOAD_LEN {
                    tracing::warn!(len = payload.len(), "part-2 frame with unexpected length");
                    return None;
                }
                let Some(part1) = self.pending_part1.take() else {
                    tracing::warn!("part 2 without a preceding part 1; discarding");
                    return None;
                };
                match decode_pair(&part1, payload) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping undecodable message pair");
                        None
                    }
                }
            }
        }
    }
}

/// Decode a completed pair into at most one event.
///
/// Message types other than ready-at-start (`0`), official end (`1`) and
/// on-line times (`2`) exist in the protocol but carry nothing the
/// scoreboard shows; they decode to `None`.
fn decode_pair(part1: &[u8], part2: &[u8]) -> Result<Option<TimingEvent>> {
    let msg_type = ascii_field(part1, 0..1, "message type")?;
    let time_kind = ascii_field(part1, 1..2, "time kind")?;

    match (msg_type, time_kind) {
        ("0", _) => Ok(Some(TimingEvent::HeatReady {
            event: num_field(part1, 7..10, "event")?,
            heat: num_field(part1, 10..12, "heat")?,
        })),
        ("1", _) => Ok(Some(TimingEvent::HeatEnd)),
        ("2", "S") => Ok(Some(TimingEvent::RaceStart)),
        ("2", "I") | ("2", "A") => {
            let time = ascii_field(part2, 5..16, "time")?.trim().to_string();
            Ok(Some(TimingEvent::LaneTime {
                event: num_field(part1, 7..10, "event")?,
                heat: num_field(part1, 10..12, "heat")?,
                rank: num_field(part1, 14..16, "rank")?,
                lane: num_field(part2, 1..2, "lane")? as u8,
                lap: num_field(part2, 2..4, "lap")?,
                finished: time_kind == "A",
                time,
            }))
        }
        _ => {
            tracing::debug!(msg_type, time_kind, "ignoring unhandled message type");
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Build a part-1 frame from its logical fields.
    pub fn part1(msg_type: char, time_kind: char, event: u32, heat: u32, rank: u32) -> Vec<u8> {
        let payload = format!("{msg_type}{time_kind} 0802{event:03}{heat:02}  {rank:2}");
        assert_eq!(payload.len(), PART1_PAYLOAD_LEN);
        let mut frame = DATA_PREFIX.to_vec();
        frame.extend_from_slice(payload.as_bytes());
        frame.push(EOT);
        frame
    }

    /// Build a part-2 frame from its logical fields.
    pub fn part2(lane: u8, lap: u32, time: &str) -> Vec<u8> {
        let payload = format!("\n{lane}{lap:02}\x02{time:>11} ");
        assert_eq!(payload.len(), PART2_PAYLOAD_LEN);
        let mut frame = DATA_PREFIX.to_vec();
        frame.extend_from_slice(payload.as_bytes());
        frame.push(EOT);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{part1, part2};
    use super::*;

    #[test]
    fn decodes_split_pair() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder.accept(&part1('2', 'I', 12, 3, 1)).is_none());
        let event = decoder.accept(&part2(4, 2, "1:03.45 ")).unwrap();

        assert_eq!(
            event,
            TimingEvent::LaneTime {
                event: 12,
                heat: 3,
                lane: 4,
                lap: 2,
                rank: 1,
                time: "1:03.45".to_string(),
                finished: false,
            }
        );
    }

    #[test]
    fn finish_kind_sets_finished() {
        let mut decoder = MessageDecoder::new();
        decoder.accept(&part1('2', 'A', 1, 1, 2));
        match decoder.accept(&part2(5, 4, "2:10.07 ")).unwrap() {
            TimingEvent::LaneTime { finished, lap, .. } => {
                assert!(finished);
                assert_eq!(lap, 4);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn heat_ready_and_end_need_no_part2_fields() {
        let mut decoder = MessageDecoder::new();
        decoder.accept(&part1('0', ' ', 7, 2, 0));
        let event = decoder.accept(&part2(0, 0, "")).unwrap();
        assert_eq!(event, TimingEvent::HeatReady { event: 7, heat: 2 });

        decoder.accept(&part1('1', ' ', 7, 2, 0));
        assert_eq!(decoder.accept(&part2(0, 0, "")).unwrap(), TimingEvent::HeatEnd);
    }

    #[test]
    fn alive_frames_are_discarded() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder.accept(&ALIVE_FRAME).is_none());
        // An alive frame between the two parts does not break pairing.
        decoder.accept(&part1('2', 'S', 1, 1, 0));
        assert!(decoder.accept(&ALIVE_FRAME).is_none());
        assert_eq!(decoder.accept(&part2(0, 0, "")).unwrap(), TimingEvent::RaceStart);
    }

    #[test]
    fn part2_without_part1_is_dropped() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder.accept(&part2(3, 1, "31.20")).is_none());
    }

    #[test]
    fn new_part1_replaces_unmatched_part1() {
        let mut decoder = MessageDecoder::new();
        decoder.accept(&part1('2', 'I', 1, 1, 9));
        decoder.accept(&part1('2', 'I', 2, 1, 5));
        match decoder.accept(&part2(6, 1, "29.88")).unwrap() {
            TimingEvent::LaneTime { event, rank, .. } => {
                assert_eq!(event, 2);
                assert_eq!(rank, 5);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn structurally_broken_frame_is_dropped() {
        let mut decoder = MessageDecoder::new();
        let mut short = DATA_PREFIX.to_vec();
        short.extend_from_slice(b"2I");
        short.push(EOT);
        assert!(decoder.accept(&short).is_none());
        assert!(decoder.pending_part1.is_none());
    }
}
