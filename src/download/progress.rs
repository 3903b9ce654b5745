//! Per-transfer progress bars.
//!
//! A [`ProgressReporter`] is shared by every fetch in a run. When enabled it
//! owns an [`indicatif::MultiProgress`] so concurrent transfers each get
//! their own line; when disabled (quiet mode, `-B` log file) every call is a
//! no-op.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BYTES_TEMPLATE: &str =
    "{msg:30!} [{bar:30}] {bytes}/{total_bytes} {binary_bytes_per_sec} eta {eta}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:30!} {bytes} {binary_bytes_per_sec}";

/// Factory for per-transfer progress bars.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
}

impl ProgressReporter {
    /// Reporter that draws bars to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            multi: Some(MultiProgress::with_draw_target(ProgressDrawTarget::stderr())),
        }
    }

    /// Reporter that draws nothing.
    #[must_use]
    pub fn hidden() -> Self {
        Self { multi: None }
    }

    /// Returns whether bars are drawn.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.multi.is_some()
    }

    /// Starts a bar for one transfer. A byte bar is used when the total is
    /// known, a spinner otherwise.
    #[must_use]
    pub fn start(&self, label: &str, total: Option<u64>) -> TransferProgress {
        let Some(multi) = &self.multi else {
            return TransferProgress { bar: None };
        };

        let bar = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(BYTES_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        bar.set_message(label.to_string());
        TransferProgress {
            bar: Some(multi.add(bar)),
        }
    }
}

/// Handle for a single transfer's bar.
#[derive(Debug)]
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    /// Advances the bar by `bytes`.
    pub fn advance(&self, bytes: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(bytes);
        }
    }

    /// Removes the bar after a completed transfer.
    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    /// Removes the bar after a failed transfer.
    pub fn abandon(self) {
        if let Some(bar) = self.bar {
            bar.abandon();
            bar.finish_and_clear();
        }
    }
}
