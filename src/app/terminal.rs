use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Log file used by `-B`.
pub(crate) const BACKGROUND_LOG_FILE: &str = "webget-log";

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_show_progress(
    stderr_is_terminal: bool,
    quiet: bool,
    background_log: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !background_log && !dumb_terminal
}

/// Level used when `RUST_LOG` is unset.
pub(crate) fn default_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Installs the global subscriber. Priority: `RUST_LOG` > CLI level.
///
/// With `log_file`, events go to that file without ANSI colors; otherwise
/// they go to stderr.
pub(crate) fn init_tracing(default_level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file '{}'", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(filter)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_ansi(!no_color_env_requested() && !is_dumb_terminal())
                .with_env_filter(filter)
                .try_init();
        }
    }
    Ok(())
}
