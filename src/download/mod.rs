//! HTTP fetching: the single-resource downloader and everything under it.
//!
//! # Features
//!
//! - Streaming fetches written through a `.part` file and renamed when complete
//! - Token-bucket throttling shared by every transfer of a run
//! - Cancellation threaded through requests, body reads and throttle waits
//! - Bounded concurrent dispatch and batch mode (`-i` URL lists)
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use webget_core::download::{CancelToken, Destination, DownloadRequest, HttpClient, ProgressReporter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let request = DownloadRequest::new(
//!     "https://example.com/paper.pdf",
//!     Destination::Directory("./downloads".into()),
//! );
//! let result = client
//!     .fetch(&request, &ProgressReporter::hidden(), &CancelToken::never())
//!     .await?;
//! println!("Downloaded: {}", result.saved_path.display());
//! # Ok(())
//! # }
//! ```

mod batch;
mod cancel;
mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod progress;
pub mod rate_limiter;
mod throttle;

pub use batch::{BatchError, BatchOutcome, BatchReport};
pub use cancel::{CancelSource, CancelToken};
pub use client::{Destination, DownloadRequest, DownloadResult, HttpClient};
pub use engine::{DEFAULT_CONCURRENCY, DownloadEngine, EngineError};
pub use error::DownloadError;
pub use filename::{claim_unique_name, ensure_scheme, expand_home, filename_from_url, mirror_path};
pub use progress::{ProgressReporter, TransferProgress};
pub use rate_limiter::{RateLimitParseError, TokenBucket, WaitCancelled, parse_rate_limit};
pub use throttle::{ThrottleError, ThrottledStream};

// Use `Result<T, DownloadError>` explicitly in signatures; no module-local
// Result alias.
