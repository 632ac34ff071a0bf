//! Error types for derivation-trace.
//!
//! Tree reconstruction never fails on malformed traces; these errors only
//! surface from I/O, JSON and configuration entry points.

use thiserror::Error;

/// Result type alias using derivation-trace's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur around trace reconstruction.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading trace text failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an I/O error with context.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
