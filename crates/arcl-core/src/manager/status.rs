// ── Status manager ──
//
// Polls `onelinestatus` and keeps the latest snapshot.

use std::sync::Arc;
use std::time::Duration;

use arcl_api::{ArclEvent, Category, Command, Connection, ConnectionState, StatusSnapshot};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;
use crate::heartbeat::{Heartbeat, Polled, poll_task};
use crate::sync::{SyncState, SyncStatus, SyncTracker};
use crate::worker::{Feed, Worker, next_event};

/// Latest `Status:` line of the connected robot.
#[derive(Clone)]
pub struct StatusManager {
    inner: Arc<StatusInner>,
}

struct StatusInner {
    connection: Connection,
    latest: watch::Sender<Option<Arc<StatusSnapshot>>>,
    sync: SyncTracker,
    heartbeat: Heartbeat,
    worker: Worker,
}

impl Polled for StatusInner {
    const NAME: &'static str = "status";

    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn sync(&self) -> &SyncTracker {
        &self.sync
    }

    fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    fn poll_commands(&self) -> Vec<Command> {
        vec![Command::OneLineStatus]
    }
}

impl StatusManager {
    pub fn new(connection: Connection) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(StatusInner {
                connection,
                latest,
                sync: SyncTracker::new(StatusInner::NAME),
                heartbeat: Heartbeat::default(),
                worker: Worker::default(),
            }),
        }
    }

    pub async fn start(&self, period: Duration) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        let cancel = inner.worker.begin(StatusInner::NAME).await?;
        inner.latest.send_replace(None);
        inner.sync.set(SyncState::Syncing, "onelinestatus");

        let events = inner.connection.subscribe(Category::Status);
        let state = inner.connection.subscribe_state();
        inner
            .worker
            .spawn(event_task(Arc::clone(inner), events, state, cancel.clone()))
            .await;
        inner
            .worker
            .spawn(poll_task(Arc::clone(inner), period, cancel))
            .await;
        Ok(())
    }

    pub async fn stop(&self) {
        self.inner.worker.stop().await;
        self.inner.latest.send_replace(None);
        self.inner.sync.set(SyncState::Idle, "stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.is_running()
    }

    pub fn snapshot(&self) -> Option<Arc<StatusSnapshot>> {
        self.inner.latest.borrow().clone()
    }

    /// Fires once per received `Status:` line.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<StatusSnapshot>>> {
        self.inner.latest.subscribe()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.heartbeat.ttl()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.inner.sync.status()
    }

    pub fn subscribe_sync(&self) -> watch::Receiver<SyncStatus> {
        self.inner.sync.subscribe()
    }

    pub async fn wait_for_sync(&self, timeout: Duration) -> bool {
        self.inner.sync.wait_for_sync(timeout).await
    }
}

impl StatusInner {
    fn handle(&self, snapshot: &StatusSnapshot) {
        self.latest.send_replace(Some(Arc::new(snapshot.clone())));
        self.heartbeat.beat();
        if self.sync.state() == SyncState::Syncing {
            self.sync.set(SyncState::InSync, "Status");
        }
    }
}

async fn event_task(
    inner: Arc<StatusInner>,
    mut events: broadcast::Receiver<Arc<ArclEvent>>,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        match next_event(StatusInner::NAME, &mut events, &mut state, &cancel).await {
            Feed::Event(event) => match event.as_ref() {
                ArclEvent::Status(snapshot) => inner.handle(snapshot),
                ArclEvent::Malformed(e) => debug!(error = %e, "skipping malformed status line"),
                _ => {}
            },
            Feed::Cancelled => break,
            Feed::ConnectionLost => {
                inner.sync.connection_lost();
                cancel.cancel();
                break;
            }
        }
    }
}
