//! Download engine for concurrent fetches.
//!
//! The [`DownloadEngine`] bundles everything a fetch needs for one run (the
//! HTTP client, the shared token bucket, the progress reporter and the
//! cancellation token) and bounds how many fetches run at once with a
//! counting semaphore.
//!
//! # Concurrency Model
//!
//! - Each fetch runs in its own Tokio task ([`DownloadEngine::spawn_fetch`])
//! - A semaphore permit is acquired inside the task before any I/O
//! - Permits are released automatically when the fetch finishes (RAII)
//! - Callers keep the join handles and await all of them before moving on
//!
//! # Example
//!
//! ```no_run
//! use webget_core::download::{Destination, DownloadEngine, DownloadRequest, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(HttpClient::new()?, 4)?;
//! let handle = engine.spawn_fetch(DownloadRequest::new(
//!     "https://example.com/a.zip",
//!     Destination::Directory("./downloads".into()),
//! ));
//! let result = handle.await??;
//! println!("saved {}", result.saved_path.display());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use super::cancel::CancelToken;
use super::client::{DownloadRequest, DownloadResult, HttpClient};
use super::error::DownloadError;
use super::progress::ProgressReporter;
use super::rate_limiter::TokenBucket;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Error type for download engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Shared fetch context for one run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: HttpClient,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    rate_limiter: Option<Arc<TokenBucket>>,
    progress: ProgressReporter,
    cancel: CancelToken,
}

impl DownloadEngine {
    /// Creates an engine allowing `concurrency` simultaneous fetches, with
    /// no rate limit, hidden progress and a token that never fires.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(client))]
    pub fn new(client: HttpClient, concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating download engine");

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            rate_limiter: None,
            progress: ProgressReporter::hidden(),
            cancel: CancelToken::never(),
        })
    }

    /// Paces every fetch through one shared bucket (an aggregate cap).
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<TokenBucket>>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Sets where per-transfer progress is drawn.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the run's cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Returns the shared token bucket, if any.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&Arc<TokenBucket>> {
        self.rate_limiter.as_ref()
    }

    /// Fetches in the calling task, outside the semaphore. Used for the one
    /// resource a run starts from.
    ///
    /// # Errors
    ///
    /// Returns whatever [`HttpClient::fetch`] returns.
    pub async fn fetch_one(&self, request: DownloadRequest) -> Result<DownloadResult, DownloadError> {
        let request = request.with_rate_limiter(self.rate_limiter.clone());
        self.client.fetch(&request, &self.progress, &self.cancel).await
    }

    /// Spawns a fetch that waits for a semaphore permit before doing I/O.
    ///
    /// The caller owns the handle and must await it; that await is the join
    /// barrier.
    pub fn spawn_fetch(
        &self,
        request: DownloadRequest,
    ) -> JoinHandle<Result<DownloadResult, DownloadError>> {
        let engine = self.clone();
        tokio::spawn(async move {
            let request = request.with_rate_limiter(engine.rate_limiter.clone());
            let permit = tokio::select! {
                biased;
                () = engine.cancel.cancelled() => None,
                permit = Arc::clone(&engine.semaphore).acquire_owned() => permit.ok(),
            };
            // The semaphore is never closed, so `None` means cancellation.
            let Some(_permit) = permit else {
                return Err(DownloadError::cancelled(request.url));
            };

            engine
                .client
                .fetch(&request, &engine.progress, &engine.cancel)
                .await
        })
    }
}
