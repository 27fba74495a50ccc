// ── Background worker lifecycle ──
//
// Each manager run owns a cancellation token and the join handles of the
// tasks it spawned. Stopping cancels the token and joins every task, so
// nothing can write into a mirror after `stop()` returns.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use arcl_api::{ArclEvent, ConnectionState};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CoreError;

#[derive(Default)]
pub(crate) struct Worker {
    cancel: ArcSwapOption<CancellationToken>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    /// Begin a new run. Tasks left over from a run that stopped itself
    /// (connection loss) are joined first.
    pub(crate) async fn begin(&self, manager: &'static str) -> Result<CancellationToken, CoreError> {
        let mut handles = self.handles.lock().await;
        if self.is_running() {
            return Err(CoreError::AlreadyRunning { manager });
        }
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let token = CancellationToken::new();
        self.cancel.store(Some(Arc::new(token.clone())));
        Ok(token)
    }

    pub(crate) async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.lock().await.push(tokio::spawn(task));
    }

    /// Token of the current run, if any.
    pub(crate) fn token(&self) -> Option<CancellationToken> {
        self.cancel.load().as_deref().cloned()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.cancel
            .load()
            .as_deref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Cancel the run and wait for every task to exit.
    pub(crate) async fn stop(&self) {
        if let Some(token) = self.cancel.swap(None) {
            token.cancel();
        }
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }
}

// ── Event feed ───────────────────────────────────────────────────────

pub(crate) enum Feed {
    Event(Arc<ArclEvent>),
    Cancelled,
    ConnectionLost,
}

/// Next event for a manager's category, or the reason to stop.
///
/// Queued events are drained before a connection drop is reported, so
/// the last lines received before the drop still reach the mirror.
pub(crate) async fn next_event(
    manager: &'static str,
    events: &mut broadcast::Receiver<Arc<ArclEvent>>,
    state: &mut watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
) -> Feed {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Feed::Cancelled,
            received = events.recv() => match received {
                Ok(event) => return Feed::Event(event),
                Err(RecvError::Lagged(n)) => {
                    warn!(manager, skipped = n, "event receiver lagged");
                }
                Err(RecvError::Closed) => return Feed::ConnectionLost,
            },
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().is_logged_in() {
                    return Feed::ConnectionLost;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let worker = Worker::default();
        worker.begin("test").await.unwrap();
        assert!(matches!(
            worker.begin("test").await,
            Err(CoreError::AlreadyRunning { manager: "test" })
        ));
    }

    #[tokio::test]
    async fn stop_joins_spawned_tasks() {
        let worker = Worker::default();
        let token = worker.begin("test").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        worker
            .spawn(async move {
                token.cancelled().await;
                let _ = tx.send(());
            })
            .await;

        worker.stop().await;
        assert!(!worker.is_running());
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn self_cancelled_run_can_restart() {
        let worker = Worker::default();
        let token = worker.begin("test").await.unwrap();
        token.cancel();
        assert!(!worker.is_running());
        assert!(worker.begin("test").await.is_ok());
    }
}
