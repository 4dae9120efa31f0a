//! Meet-management metadata ingest for the swimboard scoreboard.
//!
//! Parses the timing software's export files (contestant roster, start
//! list, event titles) into one [`EventIndex`] and watches the export
//! directory for changes. Indexes are rebuilt wholesale, never merged;
//! applying a rebuilt index at a safe point is the caller's concern.

pub mod error;
pub mod files;
pub mod index;
pub mod roster;
pub mod startlist;
pub mod titles;
pub mod watch;

// Re-exports
pub use error::{MeetError, Result};
pub use files::LstFiles;
pub use index::EventIndex;
pub use watch::MeetWatcher;
