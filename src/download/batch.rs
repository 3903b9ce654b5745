//! Batch dispatch from a newline-delimited URL list.
//!
//! Every non-blank line becomes one fetch on the engine's bounded pool.
//! Lines are dispatched while the file is still being read; the call
//! returns only after every dispatched fetch has finished.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{Destination, DownloadRequest, DownloadResult};
use super::engine::DownloadEngine;
use super::error::DownloadError;
use super::filename::{claim_unique_name, ensure_scheme, filename_from_url};

/// Failures that abort a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The list file could not be opened.
    #[error("cannot open URL list {path}: {source}")]
    Open {
        /// The list file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Result of one dispatched line.
#[derive(Debug)]
pub struct BatchOutcome {
    /// 1-based line number in the list file.
    pub line: usize,
    /// URL after scheme defaulting.
    pub url: String,
    /// What the fetch produced. `None` if its task panicked.
    pub result: Option<Result<DownloadResult, DownloadError>>,
}

impl BatchOutcome {
    /// Returns whether the fetch completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.result, Some(Ok(_)))
    }
}

/// Everything a batch produced, in line order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per dispatched (non-blank) line.
    pub outcomes: Vec<BatchOutcome>,
    /// Error that stopped reading the list early, if any.
    pub read_error: Option<std::io::Error>,
}

impl BatchReport {
    /// Number of successful fetches.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed fetches.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Number of dispatched fetches.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Iterates the failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

struct Dispatched {
    line: usize,
    url: String,
    handle: JoinHandle<Result<DownloadResult, DownloadError>>,
}

impl DownloadEngine {
    /// Fetches every URL listed in `list_path` into `output_dir`.
    ///
    /// Names are derived from each URL and made unique within the batch
    /// (`a.zip`, `a_2.zip`, …) as lines are read, so duplicate lines never
    /// write the same file.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Open`] if the list cannot be opened and
    /// [`BatchError::OutputDir`] if the output directory cannot be created.
    /// Individual fetch failures and mid-file read errors are recorded in
    /// the [`BatchReport`] instead.
    #[instrument(skip(self), fields(list = %list_path.display(), output_dir = %output_dir.display()))]
    pub async fn run_batch(
        &self,
        list_path: &Path,
        output_dir: &Path,
    ) -> Result<BatchReport, BatchError> {
        let file = tokio::fs::File::open(list_path)
            .await
            .map_err(|source| BatchError::Open {
                path: list_path.to_path_buf(),
                source,
            })?;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| BatchError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let mut lines = BufReader::new(file).lines();
        let mut taken = HashSet::new();
        let mut dispatched = Vec::new();
        let mut read_error = None;
        let mut line_no = 0usize;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "stopped reading URL list");
                    read_error = Some(e);
                    break;
                }
            };
            line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let url = ensure_scheme(trimmed);
            let destination = match Url::parse(&url) {
                Ok(parsed) => {
                    let name = claim_unique_name(&mut taken, &filename_from_url(&parsed));
                    Destination::File(output_dir.join(name))
                }
                // The fetch reports InvalidUrl.
                Err(_) => Destination::Directory(output_dir.to_path_buf()),
            };

            debug!(line = line_no, url = %url, "dispatching");
            let handle = self.spawn_fetch(DownloadRequest::new(url.as_str(), destination));
            dispatched.push(Dispatched {
                line: line_no,
                url,
                handle,
            });
        }

        info!(count = dispatched.len(), "waiting for batch downloads");

        let mut outcomes = Vec::with_capacity(dispatched.len());
        for Dispatched { line, url, handle } in dispatched {
            let result = match handle.await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(line, url = %url, error = %e, "download task panicked");
                    None
                }
            };
            if let Some(Err(e)) = &result {
                warn!(line, url = %url, error = %e, "download failed");
            }
            outcomes.push(BatchOutcome { line, url, result });
        }

        let report = BatchReport {
            outcomes,
            read_error,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            total = report.total(),
            "batch complete"
        );
        Ok(report)
    }
}
