//! Error types for texbridge library.

use crate::detect::Format;
use std::io;
use thiserror::Error;

/// Result type alias for texbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during conversion.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file extension does not map to a supported format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The input could not be decoded into a document.
    #[error("{format} decode error: {message}")]
    Decode {
        /// Format that was being decoded
        format: Format,
        /// What went wrong
        message: String,
    },

    /// The decoded document violates a model invariant.
    #[error("Structural error: {0}")]
    Structural(String),

    /// The output container could not be produced.
    #[error("{format} encode error: {message}")]
    Encode {
        /// Format that was being encoded
        format: Format,
        /// What went wrong
        message: String,
    },

    /// Conversion options are inconsistent.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The conversion was cancelled by the caller.
    #[error("Conversion cancelled")]
    Cancelled,

    /// Error during JSON rendering.
    #[error("Rendering error: {0}")]
    Render(String),
}

impl Error {
    /// Create a decode error for the given format.
    pub fn decode(format: Format, message: impl Into<String>) -> Self {
        Error::Decode {
            format,
            message: message.into(),
        }
    }

    /// Create an encode error for the given format.
    pub fn encode(format: Format, message: impl Into<String>) -> Self {
        Error::Encode {
            format,
            message: message.into(),
        }
    }

    /// Check if this error came from decoding.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::decode(Format::Docx, format!("invalid container: {}", other)),
        }
    }
}
