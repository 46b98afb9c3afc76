//! Error types for pullman
//!
//! Every failure the library reports is an [`Error`] value. The variants follow the
//! failure taxonomy of the download pipeline:
//! - talking to the provider (authentication, HTTP status, transport, response bodies)
//! - writing fetched bytes and archives to disk
//! - invalid configuration at startup
//!
//! Errors are plain values without captured backtraces. They are expected during
//! normal operation (a pull request vanishes, a token expires) and already carry a
//! structured kind and, for provider responses, the numeric status.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pullman operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pullman
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable credential for the provider
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The provider answered with a non-2xx status
    #[error("HTTP status {status}: {message}")]
    HttpStatus {
        /// The numeric HTTP status code
        status: u16,
        /// Human-readable description of the failed call
        message: String,
    },

    /// The call to the provider could not be made (connect, timeout, broken body)
    #[error("execution error: {0}")]
    Execution(String),

    /// A response body could not be parsed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Fetched bytes could not be written to their target
    #[error("download error: {0}")]
    Download(String),

    /// The content store failed to create a directory or write an archive
    #[error("storage error at {path}: {reason}")]
    Storage {
        /// The path the store was operating on
        path: PathBuf,
        /// The reason the operation failed
        reason: String,
    },

    /// Malformed base configuration (e.g. an unparsable base URL)
    #[error("init error: {0}")]
    Init(String),

    /// Configuration value out of range
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_simultaneous")
        key: Option<String>,
    },

    /// A background download was interrupted before it could finish
    #[error("download cancelled")]
    Cancelled,
}

impl Error {
    /// Build a storage error for `path` from any displayable cause.
    pub(crate) fn storage(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable error code (e.g. `"http_status"`), stable across releases.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "authentication",
            Error::HttpStatus { .. } => "http_status",
            Error::Execution(_) => "execution",
            Error::Serialization(_) => "serialization",
            Error::Download(_) => "download",
            Error::Storage { .. } => "storage",
            Error::Init(_) => "init",
            Error::Config { .. } => "config_error",
            Error::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Serialization(e.to_string())
        } else if let Some(status) = e.status() {
            Error::HttpStatus {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Error::Execution(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_only_reported_for_status_errors() {
        let err = Error::HttpStatus {
            status: 404,
            message: "unexpected HTTP status code".into(),
        };
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(err.to_string(), "HTTP status 404: unexpected HTTP status code");

        assert_eq!(Error::Cancelled.http_status(), None);
        assert_eq!(Error::Init("bad url".into()).http_status(), None);
    }

    #[test]
    fn error_codes_are_distinct() {
        let variants = vec![
            Error::Authentication("no token".into()),
            Error::HttpStatus {
                status: 500,
                message: "boom".into(),
            },
            Error::Execution("connect refused".into()),
            Error::Serialization("eof".into()),
            Error::Download("disk full".into()),
            Error::storage("/tmp/x", "denied"),
            Error::Init("bad url".into()),
            Error::Config {
                message: "zero".into(),
                key: None,
            },
            Error::Cancelled,
        ];

        let mut codes: Vec<_> = variants.iter().map(Error::error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), variants.len());
    }

    #[test]
    fn storage_error_mentions_path() {
        let err = Error::storage("/data/downloads", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/data/downloads"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn json_errors_become_serialization_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.error_code(), "serialization");
    }
}
