//! Throttled transfer stream.
//!
//! [`ThrottledStream`] wraps a stream of byte chunks (a response body) and
//! holds each chunk back until the shared [`TokenBucket`] admits its length.
//! Without a bucket, chunks pass straight through.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use thiserror::Error;

use super::cancel::CancelToken;
use super::rate_limiter::TokenBucket;

/// Failure surfaced by [`ThrottledStream::next_chunk`].
#[derive(Debug, Error)]
pub enum ThrottleError<E> {
    /// The underlying stream failed.
    #[error(transparent)]
    Inner(E),

    /// Cancellation fired while the chunk was waiting for admission.
    #[error("transfer cancelled while throttled")]
    Cancelled,
}

/// A chunk stream paced by an optional token bucket.
#[derive(Debug)]
pub struct ThrottledStream<S> {
    inner: S,
    limiter: Option<Arc<TokenBucket>>,
    cancel: CancelToken,
}

impl<S, B, E> ThrottledStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    /// Wraps `inner`. `limiter = None` disables pacing entirely.
    pub fn new(inner: S, limiter: Option<Arc<TokenBucket>>, cancel: CancelToken) -> Self {
        Self {
            inner,
            limiter,
            cancel,
        }
    }

    /// Returns whether a bucket is pacing this stream.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Reads the next chunk, waiting for admission of its length first.
    ///
    /// Returns `None` at end of stream. Errors from the inner stream are
    /// returned unchanged (wrapped in [`ThrottleError::Inner`]) without
    /// consuming tokens.
    pub async fn next_chunk(&mut self) -> Option<Result<B, ThrottleError<E>>> {
        let chunk = match self.inner.next().await? {
            Ok(chunk) => chunk,
            Err(e) => return Some(Err(ThrottleError::Inner(e))),
        };

        if let Some(limiter) = &self.limiter {
            let len = chunk.as_ref().len() as u64;
            if limiter.acquire(len, &self.cancel).await.is_err() {
                return Some(Err(ThrottleError::Cancelled));
            }
        }

        Some(Ok(chunk))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::{Duration, Instant};

    use futures_util::stream;

    use super::*;
    use crate::download::cancel::CancelSource;

    fn chunks(sizes: &[usize]) -> Vec<Result<Vec<u8>, std::io::Error>> {
        sizes.iter().map(|&n| Ok(vec![7u8; n])).collect()
    }

    #[tokio::test]
    async fn test_passthrough_without_limiter() {
        let mut throttled = ThrottledStream::new(
            stream::iter(chunks(&[3, 5, 8])),
            None,
            CancelToken::never(),
        );
        assert!(!throttled.is_throttled());

        let mut total = 0;
        while let Some(chunk) = throttled.next_chunk().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 16);
    }

    #[tokio::test]
    async fn test_inner_error_is_returned_unchanged() {
        let items: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(vec![1, 2]),
            Err(std::io::Error::other("connection reset")),
        ];
        let bucket = Arc::new(TokenBucket::new(1_000_000));
        let mut throttled =
            ThrottledStream::new(stream::iter(items), Some(bucket), CancelToken::never());

        assert_eq!(throttled.next_chunk().await.unwrap().unwrap(), vec![1, 2]);
        match throttled.next_chunk().await {
            Some(Err(ThrottleError::Inner(e))) => assert_eq!(e.to_string(), "connection reset"),
            other => panic!("expected inner error, got {other:?}"),
        }
        assert!(throttled.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_chunks_are_paced_by_bucket() {
        // 200 B/s, 20-byte burst: 20 free then 100 more ≈ 0.5s.
        let bucket = Arc::new(TokenBucket::with_burst(200, 20));
        let mut throttled = ThrottledStream::new(
            stream::iter(chunks(&[20, 50, 50])),
            Some(bucket),
            CancelToken::never(),
        );

        let start = Instant::now();
        let mut total = 0;
        while let Some(chunk) = throttled.next_chunk().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 120);
        assert!(start.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_admission_wait() {
        let bucket = Arc::new(TokenBucket::with_burst(1, 1));
        let source = CancelSource::new();
        let mut throttled = ThrottledStream::new(
            stream::iter(chunks(&[1, 500])),
            Some(bucket),
            source.token(),
        );
        assert!(throttled.next_chunk().await.unwrap().is_ok());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            source.cancel();
        });
        let result = tokio::time::timeout(Duration::from_secs(2), throttled.next_chunk())
            .await
            .unwrap();
        assert!(matches!(result, Some(Err(ThrottleError::Cancelled))));
        canceller.await.unwrap();
    }
}
