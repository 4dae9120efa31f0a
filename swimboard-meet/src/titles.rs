//! Event title resolution.
//!
//! Three sources, highest precedence first:
//!
//! 1. `events.json` — operator-editable override,
//! 2. `meetsetup.xml` — the meet-setup descriptor (title + sponsor),
//! 3. `lstrace.txt` + `lstlong.txt` + `lstround.txt` — generated generic
//!    titles ("Event 3: 50m Freestyle, Final, Women").
//!
//! Whenever titles come from source 2 or 3, the derived result is written
//! back to `events.json` so operators have something to edit.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::files::{open_latin1_csv, LstFiles};

/// Resolved per-event header strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTitles {
    pub titles: HashMap<u32, String>,
    pub texts: HashMap<u32, String>,
}

/// Stroke names by export style id.
const STYLES: [&str; 5] = ["Freestyle", "Backstroke", "Breaststroke", "Butterfly", "Medley"];

/// Resolve titles from the highest-precedence source available.
///
/// Every source that fails logs why and falls through to the next; with no
/// usable source at all the result is empty and headers degrade to
/// `"Event <n>"` downstream.
pub fn load_titles(files: &LstFiles) -> EventTitles {
    if files.events_json.is_file() {
        match load_from_events_json(&files.events_json) {
            Ok(titles) => return titles,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring broken events.json override");
            }
        }
    }

    if files.meetsetup.is_file() {
        match load_from_meetsetup(&files.meetsetup) {
            Ok(titles) => {
                write_events_json(&files.events_json, &titles);
                return titles;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not load meetsetup.xml");
            }
        }
    }

    match load_from_lst_trio(files) {
        Ok(titles) => {
            write_events_json(&files.events_json, &titles);
            titles
        }
        Err(err) => {
            tracing::warn!(error = %err, "no event title source available");
            EventTitles::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventsJsonEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

fn load_from_events_json(path: &Path) -> Result<EventTitles> {
    let text = std::fs::read_to_string(path)?;
    let entries: HashMap<String, EventsJsonEntry> = serde_json::from_str(&text)?;

    let mut out = EventTitles::default();
    for (key, entry) in entries {
        let Ok(event) = key.trim().parse::<u32>() else {
            continue;
        };
        let title = entry.title.trim();
        if !title.is_empty() {
            out.titles.insert(event, title.to_string());
        }
        out.texts.insert(event, entry.text.trim().to_string());
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct MeetSetUp {
    #[serde(rename = "Events", default)]
    events: MeetEvents,
}

#[derive(Debug, Deserialize, Default)]
struct MeetEvents {
    #[serde(rename = "Event", default)]
    events: Vec<MeetEvent>,
}

#[derive(Debug, Deserialize)]
struct MeetEvent {
    #[serde(rename = "EventNumber", default)]
    number: String,
    #[serde(rename = "EventDescription", default)]
    description: String,
    #[serde(rename = "Sponsor", default)]
    sponsor: String,
}

fn load_from_meetsetup(path: &Path) -> Result<EventTitles> {
    let text = std::fs::read_to_string(path)?;
    let setup: MeetSetUp = quick_xml::de::from_str(&text)?;

    let mut out = EventTitles::default();
    for event in setup.events.events {
        let number = event.number.trim();
        let description = event.description.trim();
        if number.is_empty() || description.is_empty() {
            continue;
        }
        let Ok(event_num) = number.parse::<u32>() else {
            continue;
        };

        let sponsor = event.sponsor.trim();
        let text = if sponsor.is_empty() {
            String::new()
        } else {
            format!("Sponsor: {sponsor}")
        };

        out.titles.insert(event_num, description.to_string());
        out.texts.insert(event_num, text);
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct RaceRow {
    #[serde(default)]
    event: String,
    #[serde(rename = "idLen", default)]
    id_len: String,
    #[serde(rename = "idStyle", default)]
    id_style: String,
    #[serde(default)]
    round: String,
    #[serde(rename = "abCat", default)]
    ab_cat: String,
}

#[derive(Debug, Deserialize)]
struct LengthRow {
    #[serde(rename = "idLength", default)]
    id_length: String,
    #[serde(rename = "Longueur", default)]
    longueur: String,
}

#[derive(Debug, Deserialize)]
struct RoundRow {
    #[serde(rename = "idRound", default)]
    id_round: String,
    #[serde(rename = "TITLE", default)]
    title: String,
}

fn load_from_lst_trio(files: &LstFiles) -> Result<EventTitles> {
    let mut lengths: HashMap<u32, String> = HashMap::new();
    for row in open_latin1_csv(&files.lengths, "lstlong")?.deserialize::<LengthRow>() {
        let Ok(row) = row else { continue };
        if let Ok(id) = row.id_length.trim().parse() {
            lengths.insert(id, row.longueur.trim().to_string());
        }
    }

    let mut rounds: HashMap<u32, String> = HashMap::new();
    for row in open_latin1_csv(&files.rounds, "lstround")?.deserialize::<RoundRow>() {
        let Ok(row) = row else { continue };
        if let Ok(id) = row.id_round.trim().parse() {
            rounds.insert(id, row.title.trim().to_string());
        }
    }

    let mut out = EventTitles::default();
    for row in open_latin1_csv(&files.races, "lstrace")?.deserialize::<RaceRow>() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(error = %err, "skipping invalid lstrace row");
                continue;
            }
        };
        let Ok(event) = row.event.trim().parse::<u32>() else {
            continue;
        };

        let title = generic_title(event, &row, &lengths, &rounds);
        out.titles.insert(event, title);
        out.texts.insert(event, String::new());
    }
    Ok(out)
}

fn generic_title(
    event: u32,
    row: &RaceRow,
    lengths: &HashMap<u32, String>,
    rounds: &HashMap<u32, String>,
) -> String {
    let resolved = (|| {
        let length = lengths.get(&row.id_len.trim().parse::<u32>().ok()?)?;
        let style = STYLES.get(row.id_style.trim().parse::<usize>().ok()?)?;
        let round = rounds.get(&row.round.trim().parse::<u32>().ok()?)?;
        let gender = match row.ab_cat.trim() {
            "X" => "Mixed",
            other if !other.is_empty() => other,
            _ => return None,
        };
        Some(format!("Event {event}: {length} {style}, {round}, {gender}"))
    })();

    resolved.unwrap_or_else(|| format!("Event {event}"))
}

/// Persist derived titles as `events.json` for operator editing. Best
/// effort: failures are logged only.
fn write_events_json(path: &Path, titles: &EventTitles) {
    let mut payload: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for (event, title) in &titles.titles {
        let text = titles.texts.get(event).map(String::as_str).unwrap_or("");
        payload.insert(
            event.to_string(),
            serde_json::json!({ "title": title, "text": text }),
        );
    }

    let result = serde_json::to_string_pretty(&payload)
        .map_err(std::io::Error::other)
        .and_then(|mut text| {
            text.push('\n');
            std::fs::write(path, text)
        });
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), error = %err, "could not write events.json");
    }
}
