//! Export-directory watcher.
//!
//! The watcher only *produces* indexes; deciding when a rebuilt index takes
//! effect is the state engine's job (it swaps at the next heat boundary).

use std::path::PathBuf;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Result;
use crate::index::EventIndex;

/// Watches an export directory and rebuilds the [`EventIndex`] on change.
///
/// Dropping the watcher stops it.
pub struct MeetWatcher {
    _watcher: RecommendedWatcher,
    lst_path: PathBuf,
}

impl MeetWatcher {
    /// Start watching `lst_path`.
    ///
    /// An initial index is built and delivered immediately (an unreadable
    /// directory delivers nothing and waits for files to appear). Every
    /// subsequent successful rebuild is passed to `on_index`; failed
    /// rebuilds are logged and the previous index stays in effect.
    pub fn start<F>(lst_path: PathBuf, on_index: F) -> Result<MeetWatcher>
    where
        F: Fn(EventIndex) + Send + 'static,
    {
        match EventIndex::load(&lst_path) {
            Ok(index) => on_index(index),
            Err(err) => {
                tracing::warn!(path = %lst_path.display(), error = %err,
                    "initial meet-data load failed; waiting for files");
            }
        }

        let reload_path = lst_path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if event.kind.is_modify() || event.kind.is_create() {
                            tracing::info!("meet export files changed, reloading");
                            match EventIndex::load(&reload_path) {
                                Ok(index) => on_index(index),
                                Err(err) => {
                                    tracing::warn!(error = %err,
                                        "meet-data reload failed; keeping previous index");
                                }
                            }
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "file watch error"),
                }
            })?;

        watcher.watch(&lst_path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %lst_path.display(), "watching meet export directory");

        Ok(MeetWatcher {
            _watcher: watcher,
            lst_path,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.lst_path
    }
}
