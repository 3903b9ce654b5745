//! Webget Core Library
//!
//! A small wget-style fetcher: single downloads, batch lists and one-page
//! site mirroring, with an optional aggregate bandwidth cap.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - HTTP fetching, throttling, cancellation and batch mode
//! - [`mirror`] - Link discovery, resolution, exclusion and rewriting for mirror mode

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod mirror;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use download::{
    BatchReport, CancelSource, CancelToken, DEFAULT_CONCURRENCY, Destination, DownloadEngine,
    DownloadError, DownloadRequest, DownloadResult, EngineError, HttpClient, ProgressReporter,
    TokenBucket, parse_rate_limit,
};
pub use mirror::{MirrorContext, MirrorEngine, MirrorError, MirrorReport};
