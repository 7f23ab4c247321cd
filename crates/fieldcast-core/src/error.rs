//! Error types for Fieldcast core library.

use thiserror::Error;

/// Result type alias using Fieldcast Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Fieldcast operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A channel or priority string did not match any known variant
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// What was being parsed ("channel", "priority").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
