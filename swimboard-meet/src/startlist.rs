//! Start list (`lststart.txt`): which bib swims in which lane of which heat.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::files::open_latin1_csv;

/// event → heat → lane → bib. Lanes are kept ordered for display.
pub type StartList = HashMap<u32, HashMap<u32, BTreeMap<u8, u32>>>;

#[derive(Debug, Deserialize)]
struct StartRow {
    #[serde(default)]
    event: String,
    #[serde(default)]
    heat: String,
    #[serde(default)]
    lane: String,
    #[serde(rename = "idBib", default)]
    id_bib: String,
}

/// Load the start list.
///
/// The export numbers heats from 0 while the timing controller sends them
/// from 1, so file heat `h` is stored as `h + 1`.
pub fn load_start_list(path: &Path) -> Result<StartList> {
    let mut reader = open_latin1_csv(path, "lststart")?;

    let mut events: StartList = HashMap::new();
    for row in reader.deserialize::<StartRow>() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(error = %err, "skipping invalid start-list row");
                continue;
            }
        };

        let parsed = (
            row.event.trim().parse::<u32>(),
            row.heat.trim().parse::<u32>(),
            row.lane.trim().parse::<u8>(),
            row.id_bib.trim().parse::<u32>(),
        );
        let (Ok(event), Ok(heat), Ok(lane), Ok(bib)) = parsed else {
            continue;
        };

        events
            .entry(event)
            .or_default()
            .entry(heat + 1)
            .or_default()
            .insert(lane, bib);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heats_are_shifted_to_wire_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lststart.txt");
        std::fs::write(
            &path,
            "event;heat;lane;idBib\n1;0;3;12\n1;0;4;13\n1;1;3;14\n2;0;5;15\n;;;\n",
        )
        .unwrap();

        let list = load_start_list(&path).unwrap();
        // File heat 0 is wire heat 1.
        let heat1 = &list[&1][&1];
        assert_eq!(heat1[&3], 12);
        assert_eq!(heat1[&4], 13);
        assert_eq!(list[&1][&2][&3], 14);
        assert_eq!(list[&2][&1][&5], 15);
        assert!(!list.contains_key(&0));
    }
}
