//! Error types for springer-dl
//!
//! This module provides the error taxonomy for the library:
//! - [`RecordError`] for metadata rows that cannot be turned into download targets
//! - [`FetchError`] for HTTP fetches that did not produce a body
//! - [`Error`], the top-level type returned by setup and coordination code
//!
//! Row-level errors never cross the record boundary during a batch: the
//! coordinator logs them and counts the row as zero downloads. Only setup errors
//! (unreadable input folder, invalid configuration) surface to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for springer-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for springer-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_rows")
        key: Option<String>,
    },

    /// Metadata record could not be turned into download targets
    #[error("malformed record: {0}")]
    Record(#[from] RecordError),

    /// Fetching a download target failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Input folder could not be read
    #[error("cannot read input folder {path}: {source}")]
    InputFolder {
        /// The folder that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client error outside of a single fetch (e.g. client construction)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Errors raised while validating a metadata record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// A required column is absent or empty
    #[error("missing required field '{field}'")]
    MissingField {
        /// Header name of the missing column
        field: &'static str,
    },

    /// The DOI does not split into exactly two non-empty segments on '/'
    #[error("malformed DOI '{doi}': expected 'prefix/suffix'")]
    MalformedDoi {
        /// The DOI as it appeared in the row
        doi: String,
    },

    /// The CSV reader could not decode the row
    #[error("unreadable row: {0}")]
    Unparseable(String),
}

/// Errors raised while fetching a single download target
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    NotFound {
        /// Requested URL
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// The request never produced a response (DNS, connect, TLS, body read)
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL
        url: String,
        /// Description of the transport failure
        message: String,
    },
}
