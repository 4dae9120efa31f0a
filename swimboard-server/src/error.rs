use thiserror::Error;

/// Validation failures for scoreboard mutations.
///
/// Every mutating operation validates its whole input before touching any
/// state, so a returned error means nothing changed.
#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("lane_count {0} out of range 1-10")]
    InvalidLaneCount(u8),

    #[error("first_lane {0} out of range 0-10")]
    InvalidFirstLane(u8),

    #[error("lap_meters {0} must be positive")]
    InvalidLapMeters(f64),

    #[error("font_scale {0} out of range 50-200")]
    InvalidFontScale(u16),

    #[error("invalid color {0:?}")]
    InvalidColor(String),

    #[error("unknown lane {0}")]
    UnknownLane(u8),
}

pub type Result<T> = std::result::Result<T, EngineError>;
