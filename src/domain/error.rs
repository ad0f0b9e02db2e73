//! Domain-level error types for jarvis-sync.
//!
//! Backend call failures are not errors here: they travel as
//! [`Envelope`](super::Envelope) values. `AppError` covers the local side
//! (configuration, persisted state, secure storage bridge, stream setup).

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// JSON parsing or serialization failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Persisted local state could not be read or written.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The native secure storage facility is present but failed.
    #[error("Secure storage error: {message}")]
    SecureStorage { message: String },

    /// A stream or socket could not be established.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Invalid or unexpected data.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

impl AppError {
    /// Create a storage error from rusqlite error.
    pub fn storage(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a secure storage error.
    pub fn secure_storage(message: impl Into<String>) -> Self {
        Self::SecureStorage {
            message: message.into(),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
