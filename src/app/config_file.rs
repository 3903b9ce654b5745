//! TOML-backed defaults for CLI options.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use webget_core::parse_rate_limit;

/// File configuration. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    /// Default output directory (`-P`).
    pub output_dir: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Default aggregate rate limit, e.g. `"2M"`.
    pub rate_limit: Option<String>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Deadline for one whole download in seconds (`--timeout`).
    pub fetch_timeout_secs: Option<u64>,
    /// Default mirror reject extensions (`-R`).
    pub reject: Option<Vec<String>>,
    /// Default mirror exclude directories (`-X`).
    pub exclude: Option<Vec<String>>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(rate) = &self.rate_limit {
            parse_rate_limit(rate)
                .with_context(|| format!("Invalid config value for `rate_limit`: {rate:?}"))?;
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs, 3600)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs, 3600)?;
        validate_timeout_secs("fetch_timeout_secs", self.fetch_timeout_secs, 86_400)?;
        Ok(())
    }

    /// Parsed `rate_limit`, if set.
    pub(crate) fn rate_limit_bytes(&self) -> Result<Option<u64>> {
        self.rate_limit
            .as_deref()
            .map(parse_rate_limit)
            .transpose()
            .context("Invalid config value for `rate_limit`")
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..={max}");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/webget/config.toml`
/// 2. `$HOME/.config/webget/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("webget").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("webget")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config named by `--config`, or the default file when present.
///
/// An explicit path that does not exist is an error; a missing default
/// file is not.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(config)
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}
