//! Error types for heartwave-node

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeartwaveError {
    #[error("Not authenticated: no verified actor id")]
    NotAuthenticated,

    #[error("Position permission denied")]
    PermissionDenied,

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for HeartwaveError {
    fn from(e: rusqlite::Error) -> Self {
        HeartwaveError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HeartwaveError>;
