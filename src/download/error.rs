//! Error types for the download module.
//!
//! This module defines structured errors for single-resource fetches,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Network-level error before a response arrived (DNS, refused connection, TLS).
    #[error("connection failed for {url}: {source}")]
    Connection {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The fetch did not finish within its deadline.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The fetch was aborted by the run's cancellation signal.
    #[error("download of {url} was cancelled")]
    Cancelled {
        /// The URL whose fetch was aborted.
        url: String,
    },

    /// Any response status other than 200.
    #[error("HTTP {status} downloading {url}")]
    UnexpectedStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Creating the destination directory or file failed.
    #[error("cannot create {path}: {source}")]
    CreateDestination {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing or finalizing the destination file failed mid-copy.
    #[error("IO error writing to {path}: {source}")]
    Write {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The response body stream failed after the headers were received.
    #[error("error reading body of {url}: {source}")]
    Body {
        /// The URL whose body failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a connection error from a reqwest error.
    pub fn connection(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connection {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an unexpected-status error.
    pub fn unexpected_status(url: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a destination-creation error.
    pub fn create_destination(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDestination {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Creates a body-stream error.
    pub fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            url: url.into(),
            source,
        }
    }

    /// Returns the HTTP status for [`DownloadError::UnexpectedStatus`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a local filesystem failure.
    #[must_use]
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::CreateDestination { .. } | Self::Write { .. })
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error does not carry.
