//! Error types for the timeline merge library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the timeline merge library
#[derive(Error, Debug)]
pub enum Error {
    /// A supplied PDF could not be parsed into a document structure
    #[error("Malformed PDF '{item}': {detail}")]
    MalformedDocument { item: String, detail: String },

    /// A supplied PDF is encrypted
    #[error("PDF '{item}' is encrypted; password-protected documents are not supported")]
    EncryptedDocument { item: String },

    /// JPEG/PNG pixel data could not be parsed
    #[error("Could not decode image '{item}': {detail}")]
    DecodeError { item: String, detail: String },

    /// Recognized as an image, but not an encoding we can place on a page
    #[error("Unsupported image encoding '{encoding}' for '{item}'")]
    UnsupportedImageEncoding { item: String, encoding: String },

    /// Neither a PDF nor an image
    #[error("Unsupported file '{item}' ({media_type})")]
    UnsupportedSource { item: String, media_type: String },

    /// The composite document is internally inconsistent
    #[error("Failed to serialize merged PDF: {0}")]
    SerializationError(String),

    /// Nothing left to merge
    #[error("No supported documents or images to merge")]
    EmptyInput,

    /// The caller aborted the merge
    #[error("Merge cancelled")]
    Cancelled,

    /// Timestamp parsing error
    #[error("Invalid timestamp expression: {0}")]
    InvalidTimestamp(String),

    /// Page size or margin that leaves no room for an image
    #[error("Invalid page geometry: {0}")]
    InvalidGeometry(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl Error {
    /// Whether this error drops a single item instead of failing the merge
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedImageEncoding { .. } | Error::UnsupportedSource { .. }
        )
    }

    /// Identity of the source item the error is about, if any
    pub fn item(&self) -> Option<&str> {
        match self {
            Error::MalformedDocument { item, .. }
            | Error::EncryptedDocument { item }
            | Error::DecodeError { item, .. }
            | Error::UnsupportedImageEncoding { item, .. }
            | Error::UnsupportedSource { item, .. } => Some(item),
            _ => None,
        }
    }
}
