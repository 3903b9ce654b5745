//! Mirror run configuration.
//!
//! [`MirrorContext`] is built once through [`MirrorContextBuilder`] and is
//! read-only afterwards; the engine and every asset task borrow it.

use url::Url;

/// Immutable settings for one mirror run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorContext {
    base_url: Url,
    reject_extensions: Vec<String>,
    exclude_directories: Vec<String>,
    convert_links: bool,
}

impl MirrorContext {
    /// Starts a builder whose base URL is `base_url`.
    #[must_use]
    pub fn builder(base_url: Url) -> MirrorContextBuilder {
        MirrorContextBuilder::new(base_url)
    }

    /// URL relative references are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lower-cased extensions (no leading `.`) whose links are skipped.
    #[must_use]
    pub fn reject_extensions(&self) -> &[String] {
        &self.reject_extensions
    }

    /// Directory prefixes whose links are skipped.
    #[must_use]
    pub fn exclude_directories(&self) -> &[String] {
        &self.exclude_directories
    }

    /// Whether fetched references are rewritten to local relative paths.
    #[must_use]
    pub fn convert_links(&self) -> bool {
        self.convert_links
    }
}

/// Builder for [`MirrorContext`].
#[derive(Debug, Clone)]
pub struct MirrorContextBuilder {
    base_url: Url,
    reject_extensions: Vec<String>,
    exclude_directories: Vec<String>,
    convert_links: bool,
}

impl MirrorContextBuilder {
    /// Builder with no exclusions and link conversion off.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            reject_extensions: Vec::new(),
            exclude_directories: Vec::new(),
            convert_links: false,
        }
    }

    /// Replaces the base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets the rejected extensions. A leading `.` is ignored and matching
    /// is case-insensitive.
    #[must_use]
    pub fn reject_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reject_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// Sets the excluded directory prefixes.
    #[must_use]
    pub fn exclude_directories<I, S>(mut self, directories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude_directories = directories
            .into_iter()
            .map(|dir| dir.as_ref().trim().to_string())
            .filter(|dir| !dir.trim_start_matches(['.', '/']).is_empty())
            .collect();
        self
    }

    /// Turns link conversion on or off.
    #[must_use]
    pub fn convert_links(mut self, convert: bool) -> Self {
        self.convert_links = convert;
        self
    }

    /// Freezes the configuration.
    #[must_use]
    pub fn build(self) -> MirrorContext {
        MirrorContext {
            base_url: self.base_url,
            reject_extensions: self.reject_extensions,
            exclude_directories: self.exclude_directories,
            convert_links: self.convert_links,
        }
    }
}

/// Splits a comma-separated flag value (`-R jpg,gif`, `-X /ads,/tmp`).
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
