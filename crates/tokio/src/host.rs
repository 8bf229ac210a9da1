//! Dispatcher task and wake plumbing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use canopy_core::{Notifier, Policy};
use canopy_machine::Machine;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Errors from the tokio host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The dispatcher task panicked or was cancelled externally.
    #[error("dispatcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// `tokio::sync::Notify`-backed wake primitive.
///
/// `notify_one` stores at most one permit, so any number of signals
/// between wakes collapse into a single delivery. While disabled, signals
/// are dropped entirely; the machine disables the wake on `stop`.
#[derive(Debug, Default)]
pub struct NotifyWake {
    notify: Notify,
    enabled: AtomicBool,
}

impl NotifyWake {
    /// Create a disabled wake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next wake edge.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl Notifier for NotifyWake {
    fn signal(&self) {
        if self.enabled.load(Ordering::Acquire) {
            self.notify.notify_one();
        }
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }
}

/// Builds the wake primitive and spawns the dispatcher task.
///
/// Construct the host first, hand [`notifier`](TokioHost::notifier) to
/// [`Machine::new`], wire the machine, `start` it, then
/// [`spawn`](TokioHost::spawn) it. The spawned task is the single
/// dispatcher of the machine.
#[derive(Debug, Default)]
pub struct TokioHost {
    wake: Arc<NotifyWake>,
}

impl TokioHost {
    /// Create a host with a fresh wake primitive.
    pub fn new() -> Self {
        Self::default()
    }

    /// The wake primitive, for `Machine::new`.
    pub fn notifier(&self) -> Arc<NotifyWake> {
        self.wake.clone()
    }

    /// Move the machine into a spawned dispatcher task.
    ///
    /// The task drains the machine on every wake until shut down. Must be
    /// called from within a tokio runtime.
    pub fn spawn<P: Policy>(self, mut machine: Machine<P>) -> HostHandle<P> {
        let wake = self.wake;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            debug!(machine = machine.name(), "dispatcher task started");
            loop {
                tokio::select! {
                    _ = wake.notified() => {
                        let dispatched = machine.drain();
                        trace!(events = dispatched, "drain complete");
                    }
                    _ = &mut shutdown_rx => {
                        debug!(machine = machine.name(), "dispatcher task shutting down");
                        break;
                    }
                }
            }
            machine
        });

        HostHandle {
            join,
            shutdown: ShutdownHandle {
                tx: Some(shutdown_tx),
            },
        }
    }
}

/// Handle for shutting down a running dispatcher task.
///
/// When dropped, signals the task to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A machine running inside a dispatcher task.
#[derive(Debug)]
pub struct HostHandle<P: Policy> {
    join: JoinHandle<Machine<P>>,
    shutdown: ShutdownHandle,
}

impl<P: Policy> HostHandle<P> {
    /// Signal the dispatcher task to exit and wait for it, returning the
    /// machine. Events still queued at shutdown stay in the machine until
    /// it is dropped.
    pub async fn shutdown(self) -> Result<Machine<P>, HostError> {
        self.shutdown.shutdown();
        Ok(self.join.await?)
    }

    /// Split off the shutdown handle, e.g. to trigger teardown from
    /// another task, and return the join handle for the machine.
    pub fn into_parts(self) -> (ShutdownHandle, JoinHandle<Machine<P>>) {
        (self.shutdown, self.join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_wake_coalesces_signals() {
        let wake = NotifyWake::new();
        wake.enable();
        wake.signal();
        wake.signal();

        // One permit stored: the first wait returns immediately, a second
        // would block.
        wake.notified().await;
        let second =
            tokio::time::timeout(std::time::Duration::from_millis(20), wake.notified()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn disabled_wake_drops_signals() {
        let wake = NotifyWake::new();
        wake.signal();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), wake.notified()).await;
        assert!(waited.is_err());
    }
}
