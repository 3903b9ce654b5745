//! Run-wide cancellation signal.
//!
//! A [`CancelSource`] is owned by whoever decides to stop a run (the CLI
//! wires it to Ctrl-C). Every fetch, token-bucket wait and join barrier
//! holds a cloned [`CancelToken`] and races its work against
//! [`CancelToken::cancelled`].

use tokio::sync::watch;

/// Sending half of the cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    sender: watch::Sender<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    /// Creates a source in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender }
    }

    /// Returns a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }

    /// Signals cancellation to every token. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Receiving half of the cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    /// Returns whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is signalled; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Source dropped without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }
}
