//! Error types for swg-analytics-core

use thiserror::Error;

/// Main error type for the swg-analytics-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Opening the channel or waiting for it to become ready failed
    #[error("channel setup failed: {0}")]
    Setup(String),

    /// Sending over an open channel failed
    #[error("channel error: {0}")]
    Channel(String),

    /// Transaction id does not have the 8-4-4-4-12 hex shape
    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(String),

    /// The dispatch worker is gone and the unit was never run
    #[error("dispatch pipeline closed")]
    Closed,
}

/// Result type alias for swg-analytics-core
pub type Result<T> = std::result::Result<T, Error>;
