//! HTTP client wrapper for fetching one resource to disk.
//!
//! [`HttpClient::fetch`] issues a GET, accepts only `200 OK`, and streams
//! the body through a [`ThrottledStream`] into `<name>.part`, renaming it to
//! the final name once every byte is on disk. On any failure the part file
//! is removed, so a file under its final name is always complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::cancel::CancelToken;
use super::constants::{CONNECT_TIMEOUT_SECS, PARTIAL_SUFFIX, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::filename_from_url;
use super::progress::{ProgressReporter, TransferProgress};
use super::rate_limiter::TokenBucket;
use super::throttle::{ThrottleError, ThrottledStream};
use crate::user_agent;

/// Where a fetched body is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Save inside this directory under the name derived from the URL.
    Directory(PathBuf),
    /// Save to exactly this path.
    File(PathBuf),
}

impl Destination {
    /// Final path for a body fetched from `url`.
    #[must_use]
    pub fn path_for(&self, url: &Url) -> PathBuf {
        match self {
            Self::Directory(dir) => dir.join(filename_from_url(url)),
            Self::File(path) => path.clone(),
        }
    }
}

/// One transfer to perform. Consumed by a single [`HttpClient::fetch`].
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Absolute `http`/`https` URL.
    pub url: String,
    /// Target directory or file.
    pub destination: Destination,
    /// Shared bucket pacing the body, if a rate limit is configured.
    pub rate_limiter: Option<Arc<TokenBucket>>,
    /// Whether missing parent directories of the target may be created.
    pub under_mirror: bool,
}

impl DownloadRequest {
    /// Unthrottled request outside mirror mode.
    pub fn new(url: impl Into<String>, destination: Destination) -> Self {
        Self {
            url: url.into(),
            destination,
            rate_limiter: None,
            under_mirror: false,
        }
    }

    /// Paces the body through `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<TokenBucket>>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Marks the request as part of a mirror run.
    #[must_use]
    pub fn under_mirror(mut self, under_mirror: bool) -> Self {
        self.under_mirror = under_mirror;
        self
    }
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Final on-disk path.
    pub saved_path: PathBuf,
    /// Bytes written.
    pub byte_count: u64,
    /// Declared `Content-Length`, when the server sent a usable one.
    pub content_length: Option<u64>,
}

/// HTTP client for streaming fetches.
///
/// Create once per run and clone freely; clones share the connection pool.
///
/// ```no_run
/// use webget_core::download::{CancelToken, Destination, DownloadRequest, HttpClient, ProgressReporter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let request = DownloadRequest::new(
///     "https://example.com/file.zip",
///     Destination::Directory("./downloads".into()),
/// );
/// let result = client
///     .fetch(&request, &ProgressReporter::hidden(), &CancelToken::never())
///     .await?;
/// println!("saved {} bytes to {}", result.byte_count, result.saved_path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    fetch_timeout: Option<Duration>,
}

impl HttpClient {
    /// Client with the default connect (30s) and read (5min) timeouts and no
    /// overall deadline.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
            None,
        )
    }

    /// Client with explicit timeouts. `fetch_timeout` bounds a whole fetch,
    /// headers and body included.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
        fetch_timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self {
            client,
            fetch_timeout,
        })
    }

    /// Fetches `request.url` into its destination.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] when the URL does not parse or is not
    ///   `http`/`https`
    /// - [`DownloadError::Connection`] / [`DownloadError::Timeout`] when no
    ///   response arrives
    /// - [`DownloadError::UnexpectedStatus`] for any status but 200
    /// - [`DownloadError::CreateDestination`] / [`DownloadError::Write`] for
    ///   filesystem failures
    /// - [`DownloadError::Body`] when the body stream breaks
    /// - [`DownloadError::Cancelled`] when `cancel` fires first
    #[instrument(skip(self, request, progress, cancel), fields(url = %request.url))]
    pub async fn fetch(
        &self,
        request: &DownloadRequest,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<DownloadResult, DownloadError> {
        let url = parse_fetchable(&request.url)?;
        if cancel.is_cancelled() {
            return Err(DownloadError::cancelled(request.url.as_str()));
        }

        let target = request.destination.path_for(&url);
        let part_path = partial_path(&target);
        info!(path = %target.display(), "start");

        let transfer = self.transfer(&url, request, &target, &part_path, progress, cancel);
        let timed = async {
            match self.fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, transfer)
                    .await
                    .unwrap_or_else(|_| Err(DownloadError::timeout(url.as_str()))),
                None => transfer.await,
            }
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::cancelled(url.as_str())),
            result = timed => result,
        };

        match result {
            Ok(done) => {
                info!(
                    path = %done.saved_path.display(),
                    bytes = done.byte_count,
                    "finished"
                );
                Ok(done)
            }
            Err(error) => {
                remove_partial(&part_path).await;
                Err(error)
            }
        }
    }

    async fn transfer(
        &self,
        url: &Url,
        request: &DownloadRequest,
        target: &Path,
        part_path: &Path,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<DownloadResult, DownloadError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url.as_str())
            } else {
                DownloadError::connection(url.as_str(), e)
            }
        })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(DownloadError::unexpected_status(url.as_str(), status));
        }

        let content_length = declared_length(response.headers());
        debug!(?content_length, "response accepted");

        let needs_parent = request.under_mirror || matches!(request.destination, Destination::Directory(_));
        if needs_parent && let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::create_destination(parent, e))?;
        }

        let file = File::create(part_path)
            .await
            .map_err(|e| DownloadError::create_destination(part_path, e))?;

        let label = target
            .file_name()
            .map_or_else(|| url.to_string(), |name| name.to_string_lossy().into_owned());
        let bar = progress.start(&label, content_length);

        let body = ThrottledStream::new(
            Box::pin(response.bytes_stream()),
            request.rate_limiter.clone(),
            cancel.clone(),
        );
        let byte_count = match stream_to_file(file, body, url, part_path, &bar).await {
            Ok(bytes) => bytes,
            Err(error) => {
                bar.abandon();
                return Err(error);
            }
        };
        bar.finish();

        tokio::fs::rename(part_path, target)
            .await
            .map_err(|e| DownloadError::write(target, e))?;

        if let Some(expected) = content_length
            && expected != byte_count
        {
            warn!(expected, received = byte_count, "body length differs from Content-Length");
        }

        Ok(DownloadResult {
            saved_path: target.to_path_buf(),
            byte_count,
            content_length,
        })
    }
}

/// Streams the throttled body into `file`, returning bytes written.
async fn stream_to_file<S, B>(
    file: File,
    mut body: ThrottledStream<S>,
    url: &Url,
    file_path: &Path,
    bar: &TransferProgress,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = body.next_chunk().await {
        let chunk = chunk.map_err(|e| match e {
            ThrottleError::Inner(e) if e.is_timeout() => DownloadError::timeout(url.as_str()),
            ThrottleError::Inner(e) => DownloadError::body(url.as_str(), e),
            ThrottleError::Cancelled => DownloadError::cancelled(url.as_str()),
        })?;

        writer
            .write_all(chunk.as_ref())
            .await
            .map_err(|e| DownloadError::write(file_path, e))?;

        let len = chunk.as_ref().len() as u64;
        bytes_written += len;
        bar.advance(len);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::write(file_path, e))?;

    Ok(bytes_written)
}

fn parse_fetchable(raw: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(raw).map_err(|_| DownloadError::invalid_url(raw))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(DownloadError::invalid_url(raw));
    }
    Ok(url)
}

/// `Content-Length` as an advisory size. Missing, unparsable and negative
/// values (servers send `-1`) all mean unknown.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|n| u64::try_from(n).ok())
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

async fn remove_partial(part_path: &Path) {
    match tokio::fs::remove_file(part_path).await {
        Ok(()) => debug!(path = %part_path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %part_path.display(), error = %e, "could not remove partial file"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::download::cancel::CancelSource;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use reqwest::header::HeaderValue;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn fetch_into_dir(url: &str, dir: &Path) -> DownloadRequest {
        DownloadRequest::new(url, Destination::Directory(dir.to_path_buf()))
    }

    fn leftover_entries(dir: &Path) -> Vec<std::fs::DirEntry> {
        std::fs::read_dir(dir).unwrap().map(Result::unwrap).collect()
    }

    #[test]
    fn test_declared_length_handles_unknown_values() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("-1"));
        assert_eq!(declared_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(declared_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(declared_length(&headers), Some(1234));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/out/a.zip")),
            PathBuf::from("/tmp/out/a.zip.part")
        );
    }

    #[test]
    fn test_destination_path_for_directory_and_file() {
        let url = Url::parse("https://e.com/files/report.pdf").unwrap();
        assert_eq!(
            Destination::Directory("out".into()).path_for(&url),
            PathBuf::from("out/report.pdf")
        );
        assert_eq!(
            Destination::File("named.bin".into()).path_for(&url),
            PathBuf::from("named.bin")
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_urls() {
        let client = HttpClient::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        for raw in ["not a url", "ftp://example.com/a.txt", "mailto:x@y.z"] {
            let result = client
                .fetch(
                    &fetch_into_dir(raw, temp_dir.path()),
                    &ProgressReporter::hidden(),
                    &CancelToken::never(),
                )
                .await;
            assert!(
                matches!(result, Err(DownloadError::InvalidUrl { .. })),
                "{raw}: {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_success_writes_file_and_reports_size() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/files/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/files/data.bin", mock_server.uri());
        let result = client
            .fetch(
                &fetch_into_dir(&url, temp_dir.path()),
                &ProgressReporter::hidden(),
                &CancelToken::never(),
            )
            .await
            .unwrap();

        assert_eq!(result.saved_path, temp_dir.path().join("data.bin"));
        assert_eq!(result.byte_count, 10);
        assert_eq!(result.content_length, Some(10));
        assert_eq!(std::fs::read(&result.saved_path).unwrap(), b"0123456789");
        assert!(!temp_dir.path().join("data.bin.part").exists());
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_unexpected_status_and_leaves_nothing() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/missing.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty.txt"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new().unwrap();
        for (route, expected) in [("/missing.txt", 404), ("/empty.txt", 204)] {
            let url = format!("{}{route}", mock_server.uri());
            let result = client
                .fetch(
                    &fetch_into_dir(&url, temp_dir.path()),
                    &ProgressReporter::hidden(),
                    &CancelToken::never(),
                )
                .await;
            match result {
                Err(DownloadError::UnexpectedStatus { status, .. }) => assert_eq!(status, expected),
                other => panic!("expected UnexpectedStatus, got {other:?}"),
            }
        }

        assert!(
            leftover_entries(temp_dir.path()).is_empty(),
            "no file may be created for a rejected response"
        );
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_connection_error() {
        let temp_dir = TempDir::new().unwrap();
        let client = HttpClient::new().unwrap();
        // Port 9 (discard) is closed on loopback in practice.
        let result = client
            .fetch(
                &fetch_into_dir("http://127.0.0.1:9/x.bin", temp_dir.path()),
                &ProgressReporter::hidden(),
                &CancelToken::never(),
            )
            .await;
        assert!(
            matches!(
                result,
                Err(DownloadError::Connection { .. } | DownloadError::Timeout { .. })
            ),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_fetch_into_file_with_missing_parent_fails_outside_mirror() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new().unwrap();
        let target = temp_dir.path().join("nope").join("a.txt");
        let url = format!("{}/a.txt", mock_server.uri());

        let result = client
            .fetch(
                &DownloadRequest::new(url.as_str(), Destination::File(target.clone())),
                &ProgressReporter::hidden(),
                &CancelToken::never(),
            )
            .await;
        assert!(matches!(result, Err(DownloadError::CreateDestination { .. })));

        let mirrored = client
            .fetch(
                &DownloadRequest::new(url.as_str(), Destination::File(target.clone())).under_mirror(true),
                &ProgressReporter::hidden(),
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert_eq!(mirrored.saved_path, target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "a");
    }

    #[tokio::test]
    async fn test_fetch_deadline_expires_as_timeout_and_cleans_up() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/slow.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::with_timeouts(
            Duration::from_secs(5),
            Duration::from_secs(30),
            Some(Duration::from_millis(300)),
        )
        .unwrap();
        let url = format!("{}/slow.bin", mock_server.uri());
        let result = client
            .fetch(
                &fetch_into_dir(&url, temp_dir.path()),
                &ProgressReporter::hidden(),
                &CancelToken::never(),
            )
            .await;

        assert!(matches!(result, Err(DownloadError::Timeout { .. })), "{result:?}");
        assert!(leftover_entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_cancelled_mid_throttle_removes_partial_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/big.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4096]))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/big.bin", mock_server.uri());
        let limiter = Some(Arc::new(TokenBucket::with_burst(10, 10)));
        let request = fetch_into_dir(&url, temp_dir.path()).with_rate_limiter(limiter);

        let source = CancelSource::new();
        let token = source.token();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            source.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.fetch(&request, &ProgressReporter::hidden(), &token),
        )
        .await
        .unwrap();
        canceller.await.unwrap();

        assert!(matches!(result, Err(DownloadError::Cancelled { .. })), "{result:?}");
        assert!(leftover_entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_with_already_cancelled_token_does_no_io() {
        let temp_dir = TempDir::new().unwrap();
        let client = HttpClient::new().unwrap();
        let source = CancelSource::new();
        source.cancel();

        let result = client
            .fetch(
                &fetch_into_dir("http://127.0.0.1:9/x.bin", temp_dir.path()),
                &ProgressReporter::hidden(),
                &source.token(),
            )
            .await;
        assert!(matches!(result, Err(DownloadError::Cancelled { .. })));
    }
}
