use std::path::PathBuf;

use thiserror::Error;

/// Hard failures of a validation run.
///
/// Validation findings (warnings, errors, fatal errors reported by the parser)
/// are never represented here: they are data and end up in an
/// [`ErrorAccumulator`](crate::report::ErrorAccumulator). The variants below
/// describe the cases where a document could not be validated at all.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decompression failed: {path} ({compression}) - {source}")]
    Decompression {
        path: PathBuf,
        compression: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parser configuration failed: {details}")]
    ParserConfiguration { details: String },

    #[error("Document too large for the parser: {document} ({size} bytes)")]
    DocumentTooLarge { document: String, size: usize },

    #[error("Document id cannot be passed to the parser: {document}")]
    InvalidDocumentId { document: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Failed to write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Parser context creation failed")]
    ParserContextCreationFailed,

    #[error("Text reader creation failed")]
    ReaderCreationFailed,
}

impl From<LibXml2Error> for ValidationError {
    fn from(err: LibXml2Error) -> Self {
        ValidationError::ParserConfiguration {
            details: err.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for ValidationError {
    fn from(err: crate::config::ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;
