//! Contestant roster (`lstconc.txt`) and club bookkeeping (`clubs.json`).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::files::open_latin1_csv;

/// One swimmer as resolved from the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contestant {
    pub name: String,
    pub club: String,
}

#[derive(Debug, Deserialize)]
struct ConcRow {
    id: String,
    #[serde(default)]
    lastname: String,
    #[serde(default)]
    firstname: String,
    #[serde(rename = "abNat", default)]
    ab_nat: String,
}

/// Load contestants keyed by bib number.
///
/// Also returns every club code seen, so the operator-facing `clubs.json`
/// can be kept up to date.
pub fn load_contestants(path: &Path) -> Result<(HashMap<u32, Contestant>, BTreeSet<String>)> {
    let mut reader = open_latin1_csv(path, "lstconc")?;

    let mut contestants = HashMap::new();
    let mut clubs_seen = BTreeSet::new();

    for row in reader.deserialize::<ConcRow>() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(error = %err, "skipping invalid contestant row");
                continue;
            }
        };

        let Ok(bib) = row.id.trim().parse::<u32>() else {
            continue;
        };
        if bib == 0 {
            continue;
        }

        let firstname = row.firstname.trim();
        let lastname = row.lastname.trim();
        let name = if !firstname.is_empty() && !lastname.is_empty() {
            format!("{firstname} {lastname}")
        } else {
            firstname.to_string() + lastname
        };

        let club = row.ab_nat.trim().to_string();
        if !club.is_empty() {
            clubs_seen.insert(club.clone());
        }

        contestants.insert(bib, Contestant { name, club });
    }

    Ok((contestants, clubs_seen))
}

/// Load the club code → display name mapping; absent or broken files are an
/// empty mapping.
pub fn load_clubs(path: &Path) -> HashMap<String, String> {
    if !path.is_file() {
        return HashMap::new();
    }
    match std::fs::read_to_string(path)
        .map_err(crate::error::MeetError::from)
        .and_then(|text| Ok(serde_json::from_str::<HashMap<String, String>>(&text)?))
    {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable clubs.json");
            HashMap::new()
        }
    }
}

/// Append newly seen club codes to `clubs.json` with empty display names so
/// an operator can fill them in. Best effort: failures are logged only.
pub fn update_clubs_file(path: &Path, clubs_seen: &BTreeSet<String>) {
    if clubs_seen.is_empty() {
        return;
    }

    let mut existing = load_clubs(path);
    let mut changed = false;
    for club in clubs_seen {
        if !existing.contains_key(club) {
            existing.insert(club.clone(), String::new());
            changed = true;
        }
    }
    if !changed {
        return;
    }

    let ordered: std::collections::BTreeMap<_, _> = existing.into_iter().collect();
    let result = serde_json::to_string_pretty(&ordered)
        .map_err(std::io::Error::other)
        .and_then(|mut text| {
            text.push('\n');
            std::fs::write(path, text)
        });
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), error = %err, "could not update clubs.json");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_contestants_and_clubs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "lstconc.txt",
            b"id;lastname;firstname;abNat\n12;Berg;Anna;OSLO\n13;Vik;;BRGN\nbad;x;y;z\n",
        );

        let (contestants, clubs) = load_contestants(&path).unwrap();
        assert_eq!(contestants.len(), 2);
        assert_eq!(contestants[&12].name, "Anna Berg");
        assert_eq!(contestants[&12].club, "OSLO");
        assert_eq!(contestants[&13].name, "Vik");
        assert_eq!(clubs.iter().collect::<Vec<_>>(), vec!["BRGN", "OSLO"]);
    }

    #[test]
    fn latin1_names_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        // "Bjørn" and "Kjærås" in ISO-8859-1.
        let path = write(
            dir.path(),
            "lstconc.txt",
            b"id;lastname;firstname;abNat\n7;Kj\xe6r\xe5s;Bj\xf8rn;OSLO\n",
        );

        let (contestants, _) = load_contestants(&path).unwrap();
        assert_eq!(contestants[&7].name, "Bj\u{f8}rn Kj\u{e6}r\u{e5}s");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_contestants(&dir.path().join("lstconc.txt")).is_err());
    }

    #[test]
    fn clubs_file_accumulates_new_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clubs.json");
        std::fs::write(&path, r#"{"OSLO": "Oslo IL"}"#).unwrap();

        let seen: BTreeSet<String> = ["OSLO".to_string(), "BRGN".to_string()].into();
        update_clubs_file(&path, &seen);

        let clubs = load_clubs(&path);
        assert_eq!(clubs["OSLO"], "Oslo IL");
        assert_eq!(clubs["BRGN"], "");
    }
}
