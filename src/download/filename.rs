//! Filename derivation, sanitization, and destination path layout.
//!
//! Every saved path is a pure function of the URL (plus the output root),
//! which is what keeps concurrent fetches from writing the same file.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use url::Url;

use super::constants::DEFAULT_FILENAME;

/// Prefixes `https://` when `raw` carries no `scheme://`.
///
/// Idempotent: a URL that already has a scheme is returned unchanged.
///
/// ```
/// use webget_core::download::ensure_scheme;
///
/// assert_eq!(ensure_scheme("example.com/a.zip"), "https://example.com/a.zip");
/// assert_eq!(ensure_scheme("http://example.com"), "http://example.com");
/// ```
#[must_use]
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Expands a leading `~/` to the user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME").filter(|home| !home.is_empty()) {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Derives the file name for `url`: the percent-decoded basename of its
/// path, or [`DEFAULT_FILENAME`] when that basename is empty or has no `.`.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let name = sanitize_filename(&decoded);
    if name.is_empty() || !name.contains('.') || !is_safe_filename_segment(&name) {
        DEFAULT_FILENAME.to_string()
    } else {
        name
    }
}

/// Path a mirrored resource is saved to:
/// `<root>/<host[_port]>/<url directories>/<filename>`.
///
/// Directory segments are percent-decoded and sanitized; empty and dot
/// segments are dropped. A last segment without a `.` is treated as a
/// directory and saved as `<segment>/index.html`. A query string is kept
/// in the name after an `@` (`p.php?id=1` becomes `p.php@id=1`), so URLs
/// that differ only in their query land in different files.
#[must_use]
pub fn mirror_path(root: &Path, url: &Url) -> PathBuf {
    let host = url.host_str().unwrap_or("localhost");
    let host_dir = match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_string(),
    };

    let mut path = root.join(sanitize_filename(&host_dir));
    let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
    let (last, dirs) = segments.split_last().map_or(("", &[][..]), |(last, dirs)| (*last, dirs));
    for segment in dirs {
        if let Some(clean) = clean_segment(segment) {
            path.push(clean);
        }
    }

    let mut name = match clean_segment(last) {
        Some(clean) if clean.contains('.') => clean,
        Some(dir) => {
            path.push(dir);
            DEFAULT_FILENAME.to_string()
        }
        None => DEFAULT_FILENAME.to_string(),
    };
    if let Some(query) = url.query().filter(|query| !query.is_empty()) {
        let decoded =
            urlencoding::decode(query).map_or_else(|_| query.to_string(), |d| d.into_owned());
        name.push('@');
        name.push_str(&sanitize_filename(&decoded));
    }
    path.push(name);
    path
}

/// Percent-decoded, sanitized path segment, or `None` if it is empty or
/// would escape its directory.
fn clean_segment(segment: &str) -> Option<String> {
    let decoded =
        urlencoding::decode(segment).map_or_else(|_| segment.to_string(), |d| d.into_owned());
    let clean = sanitize_filename(&decoded);
    (!clean.is_empty() && is_safe_filename_segment(&clean)).then_some(clean)
}

/// Returns `name` or the first free `stem_N.ext` (N from 2) not in `taken`,
/// and records the choice.
pub fn claim_unique_name(taken: &mut HashSet<String>, name: &str) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };
    let mut n = 2usize;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and `#`, which would cut a local link short.
pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
