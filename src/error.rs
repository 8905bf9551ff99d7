//! Error handling for the job scout application

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobScoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tracker error: {0}")]
    Tracker(#[from] csv::Error),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Run lock error: {0}")]
    RunLock(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, JobScoutError>;

/// Convert anyhow errors from adapter internals to our custom error type
impl From<anyhow::Error> for JobScoutError {
    fn from(err: anyhow::Error) -> Self {
        JobScoutError::Scrape(err.to_string())
    }
}
