//! Error types for calbot-core

use thiserror::Error;

/// Main error type for the calendar bot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Credentials not found for user: {0}")]
    CredentialsMissing(String),

    #[error("Calendar client error: {0}")]
    Client(String),

    #[error("Event parse error: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Scheduler error: {0}")]
    Schedule(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for calbot crates
pub type Result<T> = std::result::Result<T, Error>;
