//! Error types for the solvex library.

use std::io;
use thiserror::Error;

/// Result type alias for solvex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading and extracting documents.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not a document kind this library can read.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container or its main part is damaged.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// An anchor pattern failed to compile.
    #[error("Invalid anchor pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Error during rendering or serialization.
    #[error("Rendering error: {0}")]
    Render(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the whole document could not be read.
    pub fn is_fatal_for_document(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::UnsupportedFormat(_) | Error::CorruptDocument(_)
        )
    }
}

/// Failure of the external fallback capability. Recovered per document:
/// the document keeps its structured records and reports the reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalServiceError {
    /// No credential or client is available.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The call did not answer in time.
    #[error("service call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The credential was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The answer could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Transport or protocol failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            zip::result::ZipError::FileNotFound => {
                Error::CorruptDocument("missing package part".to_string())
            }
            _ => Error::CorruptDocument(format!("container: {}", err)),
        }
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::CorruptDocument(format!("malformed XML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedFormat("plain text".to_string());
        assert_eq!(err.to_string(), "Unsupported format: plain text");

        let err = Error::CorruptDocument("word/document.xml missing".to_string());
        assert_eq!(
            err.to_string(),
            "Corrupt document: word/document.xml missing"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_fatal_for_document());
    }

    #[test]
    fn test_xml_error_is_corrupt_document() {
        let xml_err = roxmltree::Document::parse("<a><b></a>").unwrap_err();
        let err: Error = xml_err.into();
        assert!(matches!(err, Error::CorruptDocument(_)));
    }

    #[test]
    fn test_external_service_error_display() {
        let err = ExternalServiceError::Timeout(std::time::Duration::from_secs(30));
        assert_eq!(err.to_string(), "service call timed out after 30s");
        let err = ExternalServiceError::MalformedResponse("no JSON object".to_string());
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn test_pattern_error_not_fatal() {
        let err: Error = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, Error::InvalidPattern(_)));
        assert!(!err.is_fatal_for_document());
    }
}
