//! Byte-rate limiting for download bodies.
//!
//! This module provides the [`TokenBucket`] which paces how fast response
//! bytes may be consumed, and [`parse_rate_limit`] which turns a user-facing
//! rate string (`"500k"`, `"2M"`, `"1G"`, `"750"`) into bytes per second.
//!
//! # Overview
//!
//! The bucket holds up to a fixed burst of tokens (64 KiB by default) and
//! refills at the configured rate. Each chunk read from the network must be
//! admitted before it is handed to the writer. One bucket is shared by every
//! fetch of a run, so the limit is an aggregate cap.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use webget_core::download::{CancelToken, TokenBucket, parse_rate_limit};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes_per_second = parse_rate_limit("500k")?;
//! let bucket = Arc::new(TokenBucket::new(bytes_per_second));
//!
//! // Admitted immediately: fits in the initial burst.
//! bucket.acquire(16 * 1024, &CancelToken::never()).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use super::cancel::CancelToken;
use super::constants::RATE_LIMIT_BURST_BYTES;

/// Errors produced while parsing a rate-limit string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitParseError {
    /// The input was empty or whitespace.
    #[error("rate limit is empty")]
    Empty,

    /// The numeric part is missing or not a non-negative integer.
    #[error("invalid rate limit '{input}': expected <digits>[k|M|G]")]
    InvalidNumber {
        /// The rejected input.
        input: String,
    },

    /// The suffix is not one of `k`, `M`, `G`.
    #[error("invalid rate limit unit '{unit}' in '{input}': expected k, M or G")]
    InvalidUnit {
        /// The rejected input.
        input: String,
        /// The unrecognized suffix character.
        unit: char,
    },

    /// The value does not fit in 64 bits once the unit is applied.
    #[error("rate limit '{input}' is too large")]
    Overflow {
        /// The rejected input.
        input: String,
    },
}

/// The wait for admission was interrupted by the cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct WaitCancelled;

/// Parses `<digits>[k|M|G]` into bytes per second.
///
/// Multipliers are decimal: `k` = 1,000, `M` = 1,000,000, `G` = 1,000,000,000.
/// Plain digits are bytes per second. A result of `0` means "no limit".
///
/// # Errors
///
/// Returns [`RateLimitParseError`] for an empty string, a non-numeric
/// magnitude, an unknown unit suffix, or a value that overflows `u64`.
///
/// # Examples
///
/// ```
/// use webget_core::download::parse_rate_limit;
///
/// assert_eq!(parse_rate_limit("500k"), Ok(500_000));
/// assert_eq!(parse_rate_limit("2M"), Ok(2_000_000));
/// assert_eq!(parse_rate_limit("750"), Ok(750));
/// assert!(parse_rate_limit("3X").is_err());
/// ```
pub fn parse_rate_limit(input: &str) -> Result<u64, RateLimitParseError> {
    let trimmed = input.trim();
    let Some(last) = trimmed.chars().last() else {
        return Err(RateLimitParseError::Empty);
    };

    let (digits, multiplier) = if last.is_ascii_digit() {
        (trimmed, 1)
    } else {
        let multiplier = match last {
            'k' => 1_000,
            'M' => 1_000_000,
            'G' => 1_000_000_000,
            unit => {
                return Err(RateLimitParseError::InvalidUnit {
                    input: trimmed.to_string(),
                    unit,
                });
            }
        };
        (&trimmed[..trimmed.len() - last.len_utf8()], multiplier)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RateLimitParseError::InvalidNumber {
            input: trimmed.to_string(),
        });
    }

    let magnitude = digits
        .parse::<u64>()
        .map_err(|_| RateLimitParseError::Overflow {
            input: trimmed.to_string(),
        })?;
    magnitude
        .checked_mul(multiplier)
        .ok_or_else(|| RateLimitParseError::Overflow {
            input: trimmed.to_string(),
        })
}

/// Token bucket admitting bytes at a sustained rate with a bounded burst.
///
/// `TokenBucket` is `Send + Sync`; wrap it in `Arc` and share it across
/// spawned fetch tasks. Admission uses reservations: a caller takes its
/// tokens immediately (the balance may go negative) and then sleeps off the
/// deficit, so concurrent callers are served in the order they arrive.
#[derive(Debug)]
pub struct TokenBucket {
    bytes_per_second: u64,
    burst: u64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Available tokens; negative while reservations are outstanding.
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket with the default 64 KiB burst, starting full.
    ///
    /// A rate of `0` is clamped to 1 byte per second.
    #[must_use]
    pub fn new(bytes_per_second: u64) -> Self {
        Self::with_burst(bytes_per_second, RATE_LIMIT_BURST_BYTES)
    }

    /// Creates a bucket with an explicit burst size, starting full.
    #[must_use]
    #[instrument(level = "debug")]
    #[allow(clippy::cast_precision_loss)]
    pub fn with_burst(bytes_per_second: u64, burst: u64) -> Self {
        let bytes_per_second = bytes_per_second.max(1);
        let burst = burst.max(1);
        debug!("creating token bucket");
        Self {
            bytes_per_second,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Sustained admission rate in bytes per second.
    #[must_use]
    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// Maximum number of tokens the bucket holds.
    #[must_use]
    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Waits until `bytes` tokens are admitted.
    ///
    /// Requests larger than the burst are admitted in burst-sized pieces.
    ///
    /// # Errors
    ///
    /// Returns [`WaitCancelled`] if `cancel` fires while waiting. Tokens
    /// reserved for the interrupted piece are returned to the bucket.
    pub async fn acquire(&self, bytes: u64, cancel: &CancelToken) -> Result<(), WaitCancelled> {
        let mut remaining = bytes;
        while remaining > 0 {
            let piece = remaining.min(self.burst);
            self.acquire_piece(piece, cancel).await?;
            remaining -= piece;
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn acquire_piece(&self, piece: u64, cancel: &CancelToken) -> Result<(), WaitCancelled> {
        if cancel.is_cancelled() {
            return Err(WaitCancelled);
        }

        let wait = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            self.refill(&mut state);
            state.tokens -= piece as f64;
            if state.tokens >= 0.0 {
                return Ok(());
            }
            Duration::from_secs_f64(-state.tokens / self.bytes_per_second as f64)
        };

        trace!(
            bytes = piece,
            wait_ms = wait.as_millis(),
            "waiting for token admission"
        );

        tokio::select! {
            () = tokio::time::sleep(wait) => Ok(()),
            () = cancel.cancelled() => {
                let mut state = self
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                state.tokens += piece as f64;
                Err(WaitCancelled)
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens =
            (state.tokens + elapsed * self.bytes_per_second as f64).min(self.burst as f64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::download::cancel::CancelSource;

    // ==================== parse_rate_limit Tests ====================

    #[test]
    fn test_parse_rate_limit_units_are_decimal() {
        assert_eq!(parse_rate_limit("500k"), Ok(500_000));
        assert_eq!(parse_rate_limit("2M"), Ok(2_000_000));
        assert_eq!(parse_rate_limit("1G"), Ok(1_000_000_000));
        assert_eq!(parse_rate_limit("0k"), Ok(0));
    }

    #[test]
    fn test_parse_rate_limit_bare_integer_is_bytes() {
        assert_eq!(parse_rate_limit("750"), Ok(750));
        assert_eq!(parse_rate_limit("  42 "), Ok(42));
    }

    #[test]
    fn test_parse_rate_limit_unknown_unit_rejected() {
        assert_eq!(
            parse_rate_limit("3X"),
            Err(RateLimitParseError::InvalidUnit {
                input: "3X".to_string(),
                unit: 'X'
            })
        );
        // Units are case-sensitive: `K` and `m` are not accepted.
        assert!(parse_rate_limit("3K").is_err());
        assert!(parse_rate_limit("3m").is_err());
    }

    #[test]
    fn test_parse_rate_limit_malformed_numbers_rejected() {
        assert_eq!(parse_rate_limit(""), Err(RateLimitParseError::Empty));
        assert!(matches!(
            parse_rate_limit("k"),
            Err(RateLimitParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_rate_limit("1.5M"),
            Err(RateLimitParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_rate_limit("-5k"),
            Err(RateLimitParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_parse_rate_limit_overflow_rejected() {
        assert!(matches!(
            parse_rate_limit("99999999999999999999G"),
            Err(RateLimitParseError::Overflow { .. })
        ));
        assert!(matches!(
            parse_rate_limit("18446744073709551615k"),
            Err(RateLimitParseError::Overflow { .. })
        ));
    }

    #[test]
    fn test_parse_rate_limit_scales_every_magnitude() {
        for n in [1_u64, 7, 64, 999, 12_345] {
            assert_eq!(parse_rate_limit(&format!("{n}k")), Ok(n * 1_000));
            assert_eq!(parse_rate_limit(&format!("{n}M")), Ok(n * 1_000_000));
            assert_eq!(parse_rate_limit(&format!("{n}G")), Ok(n * 1_000_000_000));
        }
    }

    // ==================== TokenBucket Tests ====================

    #[test]
    fn test_bucket_clamps_zero_rate_and_burst() {
        let bucket = TokenBucket::with_burst(0, 0);
        assert_eq!(bucket.bytes_per_second(), 1);
        assert_eq!(bucket.burst(), 1);
        assert_eq!(TokenBucket::new(10).burst(), RATE_LIMIT_BURST_BYTES);
    }

    #[tokio::test]
    async fn test_bucket_burst_is_admitted_immediately() {
        let bucket = TokenBucket::new(1);
        let start = std::time::Instant::now();
        bucket
            .acquire(RATE_LIMIT_BURST_BYTES, &CancelToken::never())
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_bucket_paces_after_burst_is_spent() {
        // 100 B/s with a 10-byte burst: 10 bytes free, then 50 bytes ≈ 0.5s.
        let bucket = TokenBucket::with_burst(100, 10);
        let cancel = CancelToken::never();
        let start = std::time::Instant::now();
        bucket.acquire(10, &cancel).await.unwrap();
        bucket.acquire(50, &cancel).await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(450),
            "elapsed {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_bucket_shared_between_tasks_caps_aggregate_rate() {
        let bucket = Arc::new(TokenBucket::with_burst(200, 20));
        let start = std::time::Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move {
                bucket.acquire(30, &CancelToken::never()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // 120 bytes total, 20 free: at least 100 / 200 = 0.5s.
        assert!(start.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_bucket_wait_is_cancellable() {
        let bucket = Arc::new(TokenBucket::with_burst(1, 1));
        let source = CancelSource::new();
        let token = source.token();
        bucket.acquire(1, &token).await.unwrap();

        let waiter = {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { bucket.acquire(1_000, &token).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(WaitCancelled));
    }

    #[tokio::test]
    async fn test_bucket_rejects_when_already_cancelled() {
        let bucket = TokenBucket::new(1_000);
        let source = CancelSource::new();
        source.cancel();
        assert_eq!(bucket.acquire(1, &source.token()).await, Err(WaitCancelled));
    }
}
