use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hub not started")]
    NotStarted,

    #[error("Hub already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, HubError>;
