//! Shutdown signalling between the pipeline and its workers.

use std::sync::Arc;
use tokio::sync::watch;

/// Sending side of the shutdown channel.
///
/// Clones share one channel, so any clone can stop every subscribed worker.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<()>>);

impl ShutdownTx {
    /// Notifies every subscribed receiver.
    ///
    /// Fails when no receiver is alive, which means no worker is running.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Returns a receiver that only observes signals sent after this call.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiving side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates the shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(Arc::new(tx)), rx)
}

/// Returns whether a shutdown was signalled since `rx` last observed the channel.
///
/// A closed channel counts as a shutdown since nobody is left to drive the worker.
pub fn is_shutdown_requested(rx: &ShutdownRx) -> bool {
    rx.has_changed().unwrap_or(true)
}
