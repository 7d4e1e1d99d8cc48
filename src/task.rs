//! Cancellation scopes for view-local background work.
//!
//! Every mounted view owns a [`ViewScope`]. Work spawned in it stops when
//! the view is unmounted: subscriptions held by that work are dropped and
//! results of in-flight calls never reach the view's state.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub(crate) struct AbortOnDrop(pub(crate) JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owner of a view's tasks; dropping it cancels all of them.
#[derive(Debug)]
pub struct ViewScope {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ViewScope {
    /// An empty, live scope.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Runs `fut` until it finishes or the scope is cancelled, whichever comes first.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            if *shutdown_rx.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                () = fut => {}
            }
        });

        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Cancels every task of the scope. Idempotent.
    pub fn cancel(&self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// Whether [`ViewScope::cancel`] ran (or the scope was dropped).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.cancel();
    }
}
