//! Constants for the download module (timeouts, throttling, naming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Token bucket burst allowance in bytes (64 KiB).
pub const RATE_LIMIT_BURST_BYTES: u64 = 64 * 1024;

/// Name used when a URL path has no extension-bearing basename.
pub const DEFAULT_FILENAME: &str = "index.html";

/// Suffix of the temporary file a body is streamed into before the rename.
pub const PARTIAL_SUFFIX: &str = ".part";
