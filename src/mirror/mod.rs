//! Mirror mode: fetch a page together with the assets it references.
//!
//! # Overview
//!
//! - [`MirrorContext`] holds the run's settings (base URL, rejected
//!   extensions, excluded directories, link conversion)
//! - [`resolve_reference`] turns a page reference into an absolute URL
//! - [`MirrorContext::exclusion`] applies the extension/directory denylist
//! - [`discover_links`] / [`rewrite_links`] scan and patch the HTML
//! - [`MirrorEngine`] drives one run through its [`MirrorPhase`]s
//!
//! # Example
//!
//! ```no_run
//! use url::Url;
//! use webget_core::download::{DownloadEngine, HttpClient};
//! use webget_core::mirror::{MirrorContext, MirrorEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Url::parse("https://example.com/")?;
//! let ctx = MirrorContext::builder(root.clone())
//!     .reject_extensions(["gif"])
//!     .convert_links(true)
//!     .build();
//! let engine = MirrorEngine::new(DownloadEngine::new(HttpClient::new()?, 8)?);
//! let report = engine.mirror(&root, &ctx, std::path::Path::new("./site")).await?;
//! println!("{} assets, {} failed", report.fetched, report.failed());
//! # Ok(())
//! # }
//! ```

mod context;
mod document;
mod engine;
mod filter;
mod phase;
mod resolve;

pub use context::{MirrorContext, MirrorContextBuilder, split_list};
pub use document::{DocumentError, LinkReference, LinkSite, discover_links, rewrite_links};
pub use engine::{AssetFailure, MirrorEngine, MirrorError, MirrorReport};
pub use filter::Exclusion;
pub use phase::MirrorPhase;
pub use resolve::{Unfetchable, resolve_reference};
