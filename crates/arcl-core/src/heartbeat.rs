// ── Liveness detection ──
//
// The protocol has no request ids, so freshness is inferred: a poll cycle
// counts as answered if any expected reply landed in the mirror before
// the next cycle. `ttl` is the time from cycle start to that reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use arcl_api::{Command, Connection};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sync::{SyncState, SyncTracker};

pub(crate) struct Heartbeat {
    beat: AtomicBool,
    cycle_start: ArcSwap<Instant>,
    ttl_ms: AtomicU64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            beat: AtomicBool::new(false),
            cycle_start: ArcSwap::from_pointee(Instant::now()),
            ttl_ms: AtomicU64::new(0),
        }
    }
}

impl Heartbeat {
    /// Called by event handlers when a reply updated the mirror.
    pub(crate) fn beat(&self) {
        let elapsed = self.cycle_start.load().elapsed();
        self.ttl_ms.store(
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        self.beat.store(true, Ordering::Release);
    }

    pub(crate) fn restart_clock(&self) {
        self.cycle_start.store(Arc::new(Instant::now()));
    }

    pub(crate) fn clear(&self) {
        self.beat.store(false, Ordering::Release);
    }

    pub(crate) fn has_beat(&self) -> bool {
        self.beat.load(Ordering::Acquire)
    }

    /// Round trip of the last answered cycle.
    pub(crate) fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }
}

// ── Poll loop ────────────────────────────────────────────────────────

/// A manager that polls on a fixed cadence.
pub(crate) trait Polled: Send + Sync + 'static {
    const NAME: &'static str;

    fn connection(&self) -> &Connection;
    fn sync(&self) -> &SyncTracker;
    fn heartbeat(&self) -> &Heartbeat;

    /// Commands to write this cycle. An empty list skips the cycle
    /// without judging liveness.
    fn poll_commands(&self) -> Vec<Command>;
}

/// Drive one manager's poll cycle until cancelled or the connection drops.
pub(crate) async fn poll_task<P: Polled>(target: Arc<P>, period: Duration, cancel: CancellationToken) {
    let heartbeat = target.heartbeat();
    let sync = target.sync();

    loop {
        let commands = target.poll_commands();
        if commands.is_empty() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(period) => continue,
            }
        }

        if sync.state() == SyncState::InSync {
            heartbeat.restart_clock();
        }
        // Cleared before writing so a fast reply is never lost.
        heartbeat.clear();

        for command in &commands {
            if let Err(e) = target.connection().send(command).await {
                warn!(manager = P::NAME, command = command.name(), error = %e, "poll write failed");
                sync.connection_lost();
                cancel.cancel();
                return;
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {}
        }

        if heartbeat.has_beat() {
            sync.transition(SyncState::Stale, SyncState::InSync, "replies resumed");
            continue;
        }

        match sync.state() {
            SyncState::InSync => {
                debug!(manager = P::NAME, period_ms = period.as_millis(), "missed heartbeat");
                sync.set(
                    SyncState::Stale,
                    format!("no reply within {}ms", period.as_millis()),
                );
            }
            SyncState::Syncing => {
                sync.set(SyncState::Syncing, "waiting for first complete reply");
            }
            SyncState::Stale | SyncState::Idle => {}
        }
    }
}
