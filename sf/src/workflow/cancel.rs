//! Cooperative cancellation for workflow runs

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Cancellation signal checked between stages
///
/// Clones share one flag. Cancelling never interrupts an in-flight model
/// call; the run stops at the next check.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        debug!("CancelToken::cancel: called");
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
