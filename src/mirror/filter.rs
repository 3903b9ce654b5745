//! Exclusion filter: extension suffixes and directory prefixes.
//!
//! Both checks are plain string tests, never globs or patterns.

use url::Url;

use super::context::MirrorContext;

/// Why a resolved link was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// The path ends with `.<ext>` for a rejected extension.
    Extension(String),
    /// The path starts with an excluded directory prefix.
    Directory(String),
}

impl MirrorContext {
    /// Returns why `resolved` (found in the page as `raw`) must not be
    /// fetched, or `None` when it is allowed.
    #[must_use]
    pub fn exclusion(&self, raw: &str, resolved: &Url) -> Option<Exclusion> {
        let path = resolved.path().to_ascii_lowercase();
        let raw_path = strip_query(raw.trim()).to_ascii_lowercase();
        for ext in self.reject_extensions() {
            let suffix = format!(".{ext}");
            if path.ends_with(&suffix) || raw_path.ends_with(&suffix) {
                return Some(Exclusion::Extension(ext.clone()));
            }
        }

        for dir in self.exclude_directories() {
            if has_dir_prefix(resolved.path(), dir) || has_dir_prefix(raw.trim(), dir) {
                return Some(Exclusion::Directory(dir.clone()));
            }
        }

        None
    }
}

/// Compares after dropping a leading `.` and any leading `/` from both
/// sides, so `./ads/x`, `/ads/x` and `ads/x` all match `ads/` or `/ads`.
fn has_dir_prefix(candidate: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_start_matches('.').trim_start_matches('/');
    if prefix.is_empty() {
        return false;
    }
    candidate
        .trim_start_matches('.')
        .trim_start_matches('/')
        .starts_with(prefix)
}

fn strip_query(value: &str) -> &str {
    value.split(['?', '#']).next().unwrap_or(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx(exts: &[&str], dirs: &[&str]) -> MirrorContext {
        MirrorContext::builder(Url::parse("https://example.com/").unwrap())
            .reject_extensions(exts)
            .exclude_directories(dirs)
            .build()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_rejected_extensions_are_dropped() {
        let ctx = ctx(&["jpg", "gif"], &[]);
        assert_eq!(
            ctx.exclusion("a.jpg", &url("https://example.com/a.jpg")),
            Some(Exclusion::Extension("jpg".into()))
        );
        assert_eq!(
            ctx.exclusion("/x/b.GIF", &url("https://example.com/x/b.GIF")),
            Some(Exclusion::Extension("gif".into()))
        );
        assert_eq!(ctx.exclusion("c.png", &url("https://example.com/c.png")), None);
    }

    #[test]
    fn test_extension_check_ignores_query() {
        let ctx = ctx(&["jpg"], &[]);
        assert!(
            ctx.exclusion("a.jpg?w=200", &url("https://example.com/a.jpg?w=200"))
                .is_some()
        );
        assert_eq!(
            ctx.exclusion("a.png?f=.jpg", &url("https://example.com/a.png?f=.jpg")),
            None
        );
    }

    #[test]
    fn test_excluded_directories_are_dropped() {
        let ctx = ctx(&[], &["ads/"]);
        assert_eq!(
            ctx.exclusion("ads/banner.png", &url("https://example.com/ads/banner.png")),
            Some(Exclusion::Directory("ads/".into()))
        );
        assert_eq!(
            ctx.exclusion("./ads/banner.png", &url("https://example.com/ads/banner.png")),
            Some(Exclusion::Directory("ads/".into()))
        );
        assert_eq!(
            ctx.exclusion("img/banner.png", &url("https://example.com/img/banner.png")),
            None
        );
    }

    #[test]
    fn test_directory_prefix_with_leading_slash() {
        let ctx = ctx(&[], &["/assets"]);
        assert!(
            ctx.exclusion("/assets/a.css", &url("https://example.com/assets/a.css"))
                .is_some()
        );
        assert!(
            ctx.exclusion("https://cdn.net/assets/a.css", &url("https://cdn.net/assets/a.css"))
                .is_some()
        );
        assert!(
            ctx.exclusion("/static/a.css", &url("https://example.com/static/a.css"))
                .is_none()
        );
    }
}
