//! The [`EventIndex`]: everything the scoreboard needs to resolve a heat.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::Result;
use crate::files::LstFiles;
use crate::roster::{self, Contestant};
use crate::startlist::{self, StartList};
use crate::titles::{self, EventTitles};

/// Immutable lookup structure built wholesale from one ingest pass.
///
/// An index is never patched in place; a change on disk produces a complete
/// replacement, and the state engine swaps indexes only at a heat boundary.
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    contestants: HashMap<u32, Contestant>,
    clubs: HashMap<String, String>,
    start_list: StartList,
    titles: EventTitles,
}

impl EventIndex {
    /// Build an index from the export directory.
    ///
    /// Roster and start list are required; title sources degrade per their
    /// own precedence rules.
    pub fn load(lst_path: &Path) -> Result<EventIndex> {
        let files = LstFiles::new(lst_path);

        let (contestants, clubs_seen) = roster::load_contestants(&files.conc)?;
        roster::update_clubs_file(&files.clubs_json, &clubs_seen);
        let clubs = roster::load_clubs(&files.clubs_json);
        let start_list = startlist::load_start_list(&files.start)?;
        let titles = titles::load_titles(&files);

        let index = EventIndex {
            contestants,
            clubs,
            start_list,
            titles,
        };
        tracing::info!(
            contestants = index.contestants.len(),
            events = index.start_list.len(),
            titles = index.titles.titles.len(),
            clubs = index.clubs.len(),
            "meet data loaded"
        );
        Ok(index)
    }

    pub fn empty() -> EventIndex {
        EventIndex::default()
    }

    /// Title for an event, if any source resolved one.
    pub fn event_title(&self, event: u32) -> Option<&str> {
        self.titles.titles.get(&event).map(String::as_str)
    }

    /// Subtext (sponsor line) for an event.
    pub fn event_text(&self, event: u32) -> Option<&str> {
        self.titles.texts.get(&event).map(String::as_str)
    }

    /// Lane → bib assignments for one heat, ordered by lane.
    pub fn heat_lanes(&self, event: u32, heat: u32) -> Option<&BTreeMap<u8, u32>> {
        self.start_list.get(&event)?.get(&heat)
    }

    /// Display name for a bib number.
    pub fn swimmer_name(&self, bib: u32) -> Option<&str> {
        self.contestants.get(&bib).map(|c| c.name.as_str())
    }

    /// Club display name for a bib, falling back to the raw code.
    pub fn swimmer_club(&self, bib: u32) -> Option<&str> {
        let code = self.contestants.get(&bib)?.club.as_str();
        if code.is_empty() {
            return None;
        }
        match self.clubs.get(code) {
            Some(name) if !name.is_empty() => Some(name),
            _ => Some(code),
        }
    }
}
