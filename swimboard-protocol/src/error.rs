use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("non-numeric {field} field: {value:?}")]
    BadField {
        field: &'static str,
        value: String,
    },

    #[error("invalid time string: {0:?}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
