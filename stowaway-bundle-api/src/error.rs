//! Error types for bundle authors

use thiserror::Error;

/// Errors that bundle code can return
#[derive(Error, Debug)]
pub enum BundleError {
    /// A symbol could not be resolved in the bundle or the host
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// A resource could not be found in the bundle or the host
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The entry point does not handle this kind of event
    #[error("Unhandled event: {0}")]
    UnhandledEvent(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl BundleError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
