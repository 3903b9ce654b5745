//! Reference resolution against the page's base URL.
//!
//! Rules, in order:
//! 1. fragment-only references (`#top`) are never fetched
//! 2. `//host/path` inherits the base scheme
//! 3. an absolute reference is used unchanged (only `http`/`https` are fetchable)
//! 4. an empty reference is the base URL itself
//! 5. `/path` is taken from the host root
//! 6. `./path` and bare `path` are joined onto the base directory (the
//!    base path, minus its last segment when that segment names a file)
//!
//! Dot segments are normalised by re-parsing the joined URL.

use thiserror::Error;
use url::Url;

/// Why a reference was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unfetchable {
    /// `#fragment` points into the page itself.
    #[error("fragment-only reference")]
    Fragment,

    /// Absolute reference with a scheme other than http/https
    /// (`mailto:`, `javascript:`, `data:`, …).
    #[error("unsupported scheme {0:?}")]
    Scheme(String),

    /// The joined URL does not parse.
    #[error("malformed reference")]
    Malformed,
}

/// Resolves `raw` against `base`. The fragment of the result is dropped.
///
/// # Errors
///
/// Returns [`Unfetchable`] for references that must not be fetched.
///
/// ```
/// use url::Url;
/// use webget_core::mirror::resolve_reference;
///
/// let base = Url::parse("https://example.com/docs/page.html").unwrap();
/// assert_eq!(
///     resolve_reference(&base, "img/a.png").unwrap().as_str(),
///     "https://example.com/docs/img/a.png"
/// );
/// assert_eq!(
///     resolve_reference(&base, "/img/a.png").unwrap().as_str(),
///     "https://example.com/img/a.png"
/// );
/// ```
pub fn resolve_reference(base: &Url, raw: &str) -> Result<Url, Unfetchable> {
    let value = raw.trim();

    if value.starts_with('#') {
        return Err(Unfetchable::Fragment);
    }

    let joined = if let Some(rest) = value.strip_prefix("//") {
        format!("{}://{rest}", base.scheme())
    } else if let Ok(absolute) = Url::parse(value) {
        return fetchable(absolute);
    } else if value.is_empty() {
        return fetchable(base.clone());
    } else if value.starts_with('/') {
        format!("{}{value}", origin(base))
    } else {
        let value = value.strip_prefix("./").unwrap_or(value);
        let dir = base_directory(base.path());
        if dir.is_empty() {
            format!("{}/{value}", origin(base))
        } else {
            format!("{}{dir}/{value}", origin(base))
        }
    };

    let url = Url::parse(&joined).map_err(|_| Unfetchable::Malformed)?;
    fetchable(url)
}

fn fetchable(mut url: Url) -> Result<Url, Unfetchable> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Unfetchable::Scheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(Unfetchable::Malformed);
    }
    url.set_fragment(None);
    Ok(url)
}

/// `scheme://host[:port]` of `base`.
fn origin(base: &Url) -> String {
    let host = base.host_str().unwrap_or_default();
    match base.port() {
        Some(port) => format!("{}://{host}:{port}", base.scheme()),
        None => format!("{}://{host}", base.scheme()),
    }
}

/// Directory part of a URL path, without a trailing `/`. `"/"` yields `""`.
fn base_directory(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if path.ends_with('/') {
        return trimmed;
    }
    match trimmed.rsplit_once('/') {
        Some((dir, last)) if last.contains('.') => dir,
        _ => trimmed,
    }
}
