//! Mirror engine: one page plus the assets it references.
//!
//! The root document is fetched first and is the only fatal fetch. Its
//! references are resolved, filtered, grouped by destination path and
//! fetched on the download engine's bounded pool. Once every asset task has
//! been joined, successfully fetched references are optionally rewritten to
//! relative local paths and the root file is overwritten.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::context::MirrorContext;
use super::document::{DocumentError, LinkSite, discover_links, rewrite_links};
use super::phase::{MirrorPhase, PhaseTracker};
use super::resolve::resolve_reference;
use crate::download::{
    Destination, DownloadEngine, DownloadError, DownloadRequest, DownloadResult, mirror_path,
};

/// Failures that abort a mirror run.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The root document could not be fetched.
    #[error("failed to fetch root document: {0}")]
    RootFetch(#[source] DownloadError),

    /// The saved root document could not be read back.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Saved root document.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The root document could not be processed as HTML.
    #[error("cannot parse {path} as HTML: {source}")]
    DocumentParse {
        /// Saved root document.
        path: PathBuf,
        /// The rewriter error.
        #[source]
        source: DocumentError,
    },

    /// The rewritten root document could not be written back.
    #[error("cannot write {path}: {source}")]
    Persist {
        /// Saved root document.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// An asset whose fetch failed. Its references were left unchanged.
#[derive(Debug)]
pub struct AssetFailure {
    /// Resolved asset URL.
    pub url: Url,
    /// Why the fetch failed; `None` if the task panicked.
    pub error: Option<DownloadError>,
}

/// Summary of a mirror run.
#[derive(Debug)]
pub struct MirrorReport {
    /// The saved root document.
    pub root: DownloadResult,
    /// References found in the root document.
    pub discovered: usize,
    /// References dropped by the exclusion filter.
    pub excluded: usize,
    /// References that are not fetchable (fragments, other schemes).
    pub skipped: usize,
    /// Distinct assets fetched successfully.
    pub fetched: usize,
    /// Assets whose fetch failed.
    pub failures: Vec<AssetFailure>,
    /// References left alone because their URL would be saved to a path
    /// already owned by a different URL.
    pub collisions: usize,
    /// References rewritten to local paths.
    pub rewritten: usize,
}

impl MirrorReport {
    /// Number of failed assets.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// One distinct destination and the references that point to it.
struct PlannedAsset {
    url: Url,
    sites: Vec<LinkSite>,
}

struct SpawnedAsset {
    url: Url,
    sites: Vec<LinkSite>,
    handle: JoinHandle<Result<DownloadResult, DownloadError>>,
}

/// Mirrors pages through a [`DownloadEngine`].
#[derive(Debug, Clone)]
pub struct MirrorEngine {
    downloads: DownloadEngine,
}

impl MirrorEngine {
    /// Wraps `downloads`; its concurrency, rate limit and cancellation apply.
    #[must_use]
    pub fn new(downloads: DownloadEngine) -> Self {
        Self { downloads }
    }

    /// Mirrors `root_url` and its directly referenced assets under
    /// `output_root/<host>/…`.
    ///
    /// Relative references are resolved against `ctx.base_url()`.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::RootFetch`] if the root document cannot be
    /// fetched, and the other [`MirrorError`] variants for local failures
    /// reading, parsing or rewriting it. Asset failures are reported in the
    /// [`MirrorReport`].
    #[instrument(skip(self, ctx), fields(root = %root_url, output = %output_root.display()))]
    pub async fn mirror(
        &self,
        root_url: &Url,
        ctx: &MirrorContext,
        output_root: &Path,
    ) -> Result<MirrorReport, MirrorError> {
        let mut phase = PhaseTracker::new();

        phase.advance(MirrorPhase::FetchingRoot);
        let root_path = mirror_path(output_root, root_url);
        let root_request =
            DownloadRequest::new(root_url.as_str(), Destination::File(root_path.clone()))
                .under_mirror(true);
        let root = match self.downloads.fetch_one(root_request).await {
            Ok(root) => root,
            Err(e) => {
                phase.advance(MirrorPhase::Failed);
                return Err(MirrorError::RootFetch(e));
            }
        };

        phase.advance(MirrorPhase::Parsing);
        let html = tokio::fs::read(&root.saved_path)
            .await
            .map_err(|source| MirrorError::Read {
                path: root.saved_path.clone(),
                source,
            })?;
        let references = discover_links(&html).map_err(|source| MirrorError::DocumentParse {
            path: root.saved_path.clone(),
            source,
        })?;
        info!(count = references.len(), "discovered references");

        phase.advance(MirrorPhase::DispatchingAssets);
        let mut excluded = 0usize;
        let mut skipped = 0usize;
        let mut collisions = 0usize;
        let mut self_sites = Vec::new();
        let mut root_key = root_url.clone();
        root_key.set_fragment(None);
        let mut order: Vec<PathBuf> = Vec::new();
        let mut planned: HashMap<PathBuf, PlannedAsset> = HashMap::new();

        for reference in &references {
            let url = match resolve_reference(ctx.base_url(), &reference.raw_value) {
                Ok(url) => url,
                Err(reason) => {
                    debug!(value = %reference.raw_value, %reason, "not fetchable");
                    skipped += 1;
                    continue;
                }
            };
            if let Some(reason) = ctx.exclusion(&reference.raw_value, &url) {
                info!(url = %url, ?reason, "excluded");
                excluded += 1;
                continue;
            }

            if url == root_key {
                self_sites.push(reference.site);
                continue;
            }

            let path = mirror_path(output_root, &url);
            if path == root.saved_path {
                warn!(url = %url, path = %path.display(), "saved path collides with the root document");
                collisions += 1;
                continue;
            }
            match planned.get_mut(&path) {
                Some(asset) if asset.url == url => asset.sites.push(reference.site),
                Some(asset) => {
                    warn!(
                        url = %url,
                        first = %asset.url,
                        path = %path.display(),
                        "saved path already claimed by another URL"
                    );
                    collisions += 1;
                }
                None => {
                    order.push(path.clone());
                    planned.insert(
                        path,
                        PlannedAsset {
                            url,
                            sites: vec![reference.site],
                        },
                    );
                }
            }
        }

        let mut spawned = Vec::with_capacity(order.len());
        for path in order {
            let Some(asset) = planned.remove(&path) else {
                continue;
            };
            debug!(url = %asset.url, path = %path.display(), "dispatching asset");
            let request = DownloadRequest::new(asset.url.as_str(), Destination::File(path))
                .under_mirror(true);
            spawned.push(SpawnedAsset {
                handle: self.downloads.spawn_fetch(request),
                url: asset.url,
                sites: asset.sites,
            });
        }

        phase.advance(MirrorPhase::AwaitingAssets);
        info!(assets = spawned.len(), "waiting for assets");
        let mut fetched = Vec::new();
        let mut failures = Vec::new();
        for SpawnedAsset { url, sites, handle } in spawned {
            match handle.await {
                Ok(Ok(result)) => fetched.push((result.saved_path, sites)),
                Ok(Err(e)) => {
                    warn!(url = %url, error = %e, "asset download failed");
                    failures.push(AssetFailure {
                        url,
                        error: Some(e),
                    });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "asset task panicked");
                    failures.push(AssetFailure { url, error: None });
                }
            }
        }

        phase.advance(MirrorPhase::Rewriting);
        let mut rewritten = 0;
        if ctx.convert_links() {
            let root_dir = root.saved_path.parent().unwrap_or_else(|| Path::new(""));
            let mut replacements = HashMap::new();
            if let Some(local) = relative_link(root_dir, &root.saved_path) {
                for site in self_sites {
                    replacements.insert(site, local.clone());
                }
            }
            for (saved_path, sites) in &fetched {
                if let Some(local) = relative_link(root_dir, saved_path) {
                    for site in sites {
                        replacements.insert(*site, local.clone());
                    }
                }
            }

            if !replacements.is_empty() {
                let (document, count) =
                    rewrite_links(&html, &replacements).map_err(|source| {
                        MirrorError::DocumentParse {
                            path: root.saved_path.clone(),
                            source,
                        }
                    })?;
                tokio::fs::write(&root.saved_path, document)
                    .await
                    .map_err(|source| MirrorError::Persist {
                        path: root.saved_path.clone(),
                        source,
                    })?;
                rewritten = count;
                info!(rewritten, path = %root.saved_path.display(), "rewrote links");
            }
        }
        phase.advance(MirrorPhase::Done);

        let report = MirrorReport {
            root,
            discovered: references.len(),
            excluded,
            skipped,
            fetched: fetched.len(),
            failures,
            collisions,
            rewritten,
        };
        info!(
            fetched = report.fetched,
            failed = report.failed(),
            excluded = report.excluded,
            skipped = report.skipped,
            collisions = report.collisions,
            phase = %phase.current(),
            "mirror complete"
        );
        Ok(report)
    }
}

/// `/`-separated path from `from_dir` to `target`, for use in HTML.
fn relative_link(from_dir: &Path, target: &Path) -> Option<String> {
    let relative = pathdiff::diff_paths(target, from_dir)?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| match component {
            Component::ParentDir => Some("..".to_string()),
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
