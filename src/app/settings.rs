//! Effective run settings: CLI flags layered over the config file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use webget_core::DEFAULT_CONCURRENCY;
use webget_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use webget_core::download::expand_home;
use webget_core::mirror::split_list;

use super::config_file::FileConfig;
use crate::cli::Args;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpTimeoutSettings {
    pub(crate) connect: Duration,
    pub(crate) read: Duration,
    pub(crate) fetch: Option<Duration>,
}

impl Default for HttpTimeoutSettings {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(READ_TIMEOUT_SECS),
            fetch: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSettings {
    pub(crate) output_dir: PathBuf,
    /// Whether the output directory came from `-P` or the config file.
    pub(crate) output_dir_explicit: bool,
    pub(crate) concurrency: usize,
    pub(crate) rate_limit: Option<u64>,
    pub(crate) timeouts: HttpTimeoutSettings,
    pub(crate) reject: Vec<String>,
    pub(crate) exclude: Vec<String>,
}

impl RunSettings {
    /// CLI values win over file values; file values win over built-in defaults.
    pub(crate) fn resolve(args: &Args, file: Option<&FileConfig>) -> Result<Self> {
        let file_output = file.and_then(|f| f.output_dir.clone());
        let output_dir = args.directory_prefix.clone().or(file_output);
        let output_dir_explicit = output_dir.is_some();
        let output_dir = output_dir.map_or_else(|| PathBuf::from("."), |dir| expand_home(&dir));

        let concurrency = args
            .concurrency
            .or_else(|| file.and_then(|f| f.concurrency))
            .map_or(DEFAULT_CONCURRENCY, usize::from);

        let rate_limit = match args.rate_limit {
            Some(rate) => Some(rate),
            None => match file {
                Some(file) => file.rate_limit_bytes()?,
                None => None,
            },
        }
        .filter(|&rate| rate > 0);

        let defaults = HttpTimeoutSettings::default();
        let timeouts = HttpTimeoutSettings {
            connect: file
                .and_then(|f| f.connect_timeout_secs)
                .map_or(defaults.connect, Duration::from_secs),
            read: file
                .and_then(|f| f.read_timeout_secs)
                .map_or(defaults.read, Duration::from_secs),
            fetch: args
                .timeout
                .or_else(|| file.and_then(|f| f.fetch_timeout_secs))
                .map(Duration::from_secs),
        };

        let reject = match &args.reject {
            Some(list) => split_list(list),
            None => file.and_then(|f| f.reject.clone()).unwrap_or_default(),
        };
        let exclude = match &args.exclude {
            Some(list) => split_list(list),
            None => file.and_then(|f| f.exclude.clone()).unwrap_or_default(),
        };

        Ok(Self {
            output_dir,
            output_dir_explicit,
            concurrency,
            rate_limit,
            timeouts,
            reject,
            exclude,
        })
    }
}
