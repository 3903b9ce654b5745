//! CLI entry point for webget.

use std::process::ExitCode;

use clap::Parser;
use tracing::warn;
use webget_core::CancelSource;

mod app;
mod cli;

use cli::Args;

/// How a run ended, as seen by the calling shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Some downloads finished, some did not.
    Partial,
    Failure,
}

impl ProcessExit {
    pub(crate) fn from_counts(completed: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if completed == 0 {
            Self::Failure
        } else {
            Self::Partial
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let cancel = CancelSource::new();
    let token = cancel.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling downloads");
            cancel.cancel();
        }
    });

    match app::runtime::run_webget(args, token).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("webget: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}
