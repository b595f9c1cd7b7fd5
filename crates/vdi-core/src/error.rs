//! Error types for the image store adapter

use thiserror::Error;

/// Result type alias using the store Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the image store adapter
#[derive(Error, Debug)]
pub enum Error {
    // Backend errors
    #[error("Backend error: {message}")]
    Backend { message: String },

    // Image lifecycle errors
    #[error("Image {image_id} already exists")]
    Duplicate { image_id: String },

    #[error("Image {image_id} not found")]
    NotFound { image_id: String },

    #[error("Random access reads are not supported by this store")]
    RandomGetNotSupported,

    // Location errors
    #[error("Invalid location {uri}: {reason}")]
    BadLocation { uri: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Shorthand for a backend error carrying the tool's message
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backend { .. } | Error::Io(_))
    }

    /// Returns true if the error was caused by the request rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Duplicate { .. }
                | Error::NotFound { .. }
                | Error::BadLocation { .. }
                | Error::RandomGetNotSupported
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
