use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} file not found at {}", path.display())]
    Missing {
        kind: &'static str,
        path: PathBuf,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid XML in meetsetup.xml: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, MeetError>;
