use thiserror::Error;

/// Why a leaderboard name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name is longer than 20 characters")]
    TooLong,
    #[error("name is only digits")]
    NumericOnly,
    #[error("name contains characters other than letters and digits")]
    NotAlphanumeric,
}

/// Main error type for quickdraw operations.
///
/// Every variant is local and recoverable; the UI layer is expected to turn
/// it into a message (see [`Error::user_message`]) rather than abort.
#[derive(Debug, Error)]
pub enum Error {
    /// Countdown started with a non-positive duration.
    #[error("invalid duration: {seconds}s")]
    InvalidDuration { seconds: i64 },

    /// Round delay range is negative or inverted.
    #[error("invalid delay range: {min_ms}..={max_ms} ms")]
    InvalidRange { min_ms: i64, max_ms: i64 },

    /// Leaderboard name failed validation.
    #[error("invalid name: {reason}")]
    InvalidName { reason: NameError },

    /// Score is NaN or infinite and cannot be ranked or stored.
    #[error("invalid metric: {value}")]
    InvalidMetric { value: f64 },

    /// Average requested over an empty sample set.
    #[error("no samples recorded yet")]
    NoSamples,

    /// Local storage refused or failed a write.
    #[error("persistence failure: {message}")]
    Persistence { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    pub fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence {
            message: message.into(),
        }
    }

    /// True for failures of the backing store, as opposed to bad input.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Error::Persistence { .. } | Error::Io(_) | Error::Json(_) | Error::Sqlite(_)
        )
    }

    /// Short alert-style text for the player.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidDuration { .. } => "Timer length must be at least one second.".into(),
            Error::InvalidRange { .. } => "Round delay range is not valid.".into(),
            Error::InvalidName { reason } => match reason {
                NameError::Empty => "Name cannot be empty!".into(),
                NameError::TooLong => "Name cannot be longer than 20 characters!".into(),
                NameError::NumericOnly => "Name cannot be only numbers!".into(),
                NameError::NotAlphanumeric => "Name can only contain letters and numbers!".into(),
            },
            Error::InvalidMetric { .. } => "That score cannot be recorded.".into(),
            Error::NoSamples => "No results yet.".into(),
            _ => "Your score could not be saved on this device.".into(),
        }
    }
}

/// Result type alias using quickdraw's Error.
pub type Result<T> = std::result::Result<T, Error>;
