//! Broadcast shutdown signal.

use tokio::sync::watch;

/// Sending side of the shutdown signal.
///
/// Cloning the sender is cheap and every clone triggers the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals every subscriber to shut down.
    ///
    /// Calling this more than once has no additional effect.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Returns whether shutdown was already requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver. Receivers created after the signal observe it immediately.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown is requested or once every sender is gone.
    ///
    /// The future is cancel safe and can be used as a `tokio::select!` branch.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.0.clone();
        let _ = rx.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a new shutdown channel in the "running" state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
