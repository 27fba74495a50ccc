// ── Sync state ──
//
// Every manager owns one `SyncTracker`. Only the manager's own tasks
// write it; callers observe through `watch` receivers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// How far a mirror can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
pub enum SyncState {
    /// Manager is not running.
    #[default]
    Idle,
    /// Waiting for the first complete reply.
    Syncing,
    /// Was in sync, but the server stopped answering.
    Stale,
    InSync,
}

impl SyncState {
    /// `true` once the mirror has been complete at least once in this run.
    pub fn was_synced(self) -> bool {
        matches!(self, Self::InSync | Self::Stale)
    }
}

/// Current state plus a short free-text reason.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub reason: String,
}

pub(crate) struct SyncTracker {
    manager: &'static str,
    status: watch::Sender<SyncStatus>,
}

impl SyncTracker {
    pub(crate) fn new(manager: &'static str) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self { manager, status }
    }

    /// Set state and reason. Returns `true` if the state itself changed.
    pub(crate) fn set(&self, state: SyncState, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut state_changed = false;
        self.status.send_if_modified(|current| {
            if current.state == state && current.reason == reason {
                return false;
            }
            state_changed = current.state != state;
            current.state = state;
            current.reason.clone_from(&reason);
            true
        });
        if state_changed {
            info!(manager = self.manager, %state, reason = %reason, "sync state changed");
        }
        state_changed
    }

    /// Move to `state` only when currently in `from`.
    pub(crate) fn transition(&self, from: SyncState, to: SyncState, reason: &str) -> bool {
        if self.state() != from {
            return false;
        }
        self.set(to, reason)
    }

    /// The connection went away. A mirror that was never complete drops
    /// back to `Idle`; anything else is now `Stale`.
    pub(crate) fn connection_lost(&self) {
        let next = if self.state().was_synced() {
            SyncState::Stale
        } else {
            SyncState::Idle
        };
        self.set(next, "connection lost");
    }

    pub(crate) fn state(&self) -> SyncState {
        self.status.borrow().state
    }

    pub(crate) fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Wait up to `timeout` for `InSync`. Returns `false` on timeout.
    pub(crate) async fn wait_for_sync(&self, timeout: Duration) -> bool {
        let mut rx = self.status.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| s.state == SyncState::InSync)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_state_changes_only() {
        let tracker = SyncTracker::new("test");
        assert!(tracker.set(SyncState::Syncing, "QueueShow"));
        assert!(!tracker.set(SyncState::Syncing, "still waiting"));
        assert_eq!(tracker.status().reason, "still waiting");
        assert!(tracker.set(SyncState::InSync, "EndQueueShow"));
    }

    #[test]
    fn connection_lost_keeps_syncing_and_stale_apart() {
        let tracker = SyncTracker::new("test");
        tracker.set(SyncState::Syncing, "");
        tracker.connection_lost();
        assert_eq!(tracker.state(), SyncState::Idle);

        tracker.set(SyncState::InSync, "");
        tracker.connection_lost();
        assert_eq!(tracker.state(), SyncState::Stale);
    }

    #[test]
    fn transition_is_conditional() {
        let tracker = SyncTracker::new("test");
        assert!(!tracker.transition(SyncState::Stale, SyncState::InSync, "x"));
        tracker.set(SyncState::Stale, "");
        assert!(tracker.transition(SyncState::Stale, SyncState::InSync, "x"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sync_times_out_without_error() {
        let tracker = SyncTracker::new("test");
        assert!(!tracker.wait_for_sync(Duration::from_millis(100)).await);

        tracker.set(SyncState::InSync, "");
        assert!(tracker.wait_for_sync(Duration::from_millis(100)).await);
    }
}
