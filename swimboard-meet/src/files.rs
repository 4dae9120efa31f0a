//! Well-known file names inside a meet-management export directory.

use std::path::{Path, PathBuf};

/// Resolved paths of every export file the ingest knows about.
///
/// Only `lstconc.txt` and `lststart.txt` are required for a usable index;
/// the title sources are consulted in precedence order and may all be
/// absent.
#[derive(Debug, Clone)]
pub struct LstFiles {
    pub base_dir: PathBuf,
    /// Contestants (bib, name, club code).
    pub conc: PathBuf,
    /// Start list (event/heat/lane → bib).
    pub start: PathBuf,
    /// Operator-editable title override.
    pub events_json: PathBuf,
    /// Meet-setup descriptor (titles + sponsors).
    pub meetsetup: PathBuf,
    /// Fallback trio for generated generic titles.
    pub races: PathBuf,
    pub lengths: PathBuf,
    pub rounds: PathBuf,
    /// Club code → display name, maintained for operators.
    pub clubs_json: PathBuf,
}

/// Open a semicolon-separated LST export as CSV.
///
/// The meet-management software writes ISO-8859-1; decoding up front keeps
/// the rest of the pipeline in plain UTF-8 strings.
pub(crate) fn open_latin1_csv(
    path: &Path,
    kind: &'static str,
) -> crate::error::Result<csv::Reader<std::io::Cursor<Vec<u8>>>> {
    if !path.is_file() {
        return Err(crate::error::MeetError::Missing {
            kind,
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read(path)?;
    let text = encoding_rs::mem::decode_latin1(&raw).into_owned();
    Ok(csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(std::io::Cursor::new(text.into_bytes())))
}

impl LstFiles {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        Self {
            conc: base_dir.join("lstconc.txt"),
            start: base_dir.join("lststart.txt"),
            events_json: base_dir.join("events.json"),
            meetsetup: base_dir.join("meetsetup.xml"),
            races: base_dir.join("lstrace.txt"),
            lengths: base_dir.join("lstlong.txt"),
            rounds: base_dir.join("lstround.txt"),
            clubs_json: base_dir.join("clubs.json"),
            base_dir,
        }
    }
}
