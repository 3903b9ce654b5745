//! Lifecycle of one mirror invocation.

use std::fmt;

use tracing::debug;

/// Stage a mirror run is in.
///
/// `Idle → FetchingRoot → {Failed | Parsing} → DispatchingAssets →
/// AwaitingAssets → Rewriting → Done`. `Failed` is only reachable from
/// `FetchingRoot`; asset failures never leave `AwaitingAssets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    /// Configured, nothing fetched yet.
    Idle,
    /// Downloading the root document.
    FetchingRoot,
    /// The root document could not be fetched; the run is over.
    Failed,
    /// Scanning the saved root document for references.
    Parsing,
    /// Resolving, filtering and spawning asset fetches.
    DispatchingAssets,
    /// Waiting at the join barrier for every asset fetch.
    AwaitingAssets,
    /// Rewriting converted links and persisting the root document.
    Rewriting,
    /// Finished; the report is final.
    Done,
}

impl MirrorPhase {
    /// Returns whether `self → next` is a legal step.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use MirrorPhase::{
            AwaitingAssets, DispatchingAssets, Done, FetchingRoot, Failed, Idle, Parsing, Rewriting,
        };
        matches!(
            (self, next),
            (Idle, FetchingRoot)
                | (FetchingRoot, Failed | Parsing)
                | (Parsing, DispatchingAssets)
                | (DispatchingAssets, AwaitingAssets)
                | (AwaitingAssets, Rewriting)
                | (Rewriting, Done)
        )
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }
}

impl fmt::Display for MirrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingRoot => "fetching-root",
            Self::Failed => "failed",
            Self::Parsing => "parsing",
            Self::DispatchingAssets => "dispatching-assets",
            Self::AwaitingAssets => "awaiting-assets",
            Self::Rewriting => "rewriting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks the current phase and rejects illegal steps in debug builds.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: MirrorPhase,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            phase: MirrorPhase::Idle,
        }
    }

    /// Phase most recently entered.
    pub(crate) fn current(&self) -> MirrorPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: MirrorPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal mirror transition {} -> {next}",
            self.phase
        );
        debug!(from = %self.phase, to = %next, "mirror phase");
        self.phase = next;
    }
}
