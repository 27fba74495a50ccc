// ── Robot roster manager ──
//
// Polls `queueShowRobot` and keeps the last reported state of every robot.

use std::sync::Arc;
use std::time::Duration;

use arcl_api::{ArclEvent, Category, Command, Connection, ConnectionState, QueueStatus, RobotLine};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;
use crate::heartbeat::{Heartbeat, Polled, poll_task};
use crate::model::Robot;
use crate::store::Mirror;
use crate::stream::MirrorStream;
use crate::sync::{SyncState, SyncStatus, SyncTracker};
use crate::worker::{Feed, Worker, next_event};

/// Mirror of the fleet's robot roster.
#[derive(Clone)]
pub struct RobotManager {
    inner: Arc<RobotInner>,
}

struct RobotInner {
    connection: Connection,
    robots: Mirror<Robot>,
    sync: SyncTracker,
    heartbeat: Heartbeat,
    worker: Worker,
}

impl Polled for RobotInner {
    const NAME: &'static str = "robots";

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
        vec![Command::QueueShowRobot]
    }
}

impl RobotManager {
    pub fn new(connection: Connection) -> Self {
        Self {
            inner: Arc::new(RobotInner {
                connection,
                robots: Mirror::new(),
                sync: SyncTracker::new(RobotInner::NAME),
                heartbeat: Heartbeat::default(),
                worker: Worker::default(),
            }),
        }
    }

    /// Clear the roster and poll it every `period`.
    pub async fn start(&self, period: Duration) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        let cancel = inner.worker.begin(RobotInner::NAME).await?;
        inner.robots.clear();
        inner.sync.set(SyncState::Syncing, "queueShowRobot");

        let events = inner.connection.subscribe(Category::Robot);
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
        self.inner.robots.clear();
        self.inner.sync.set(SyncState::Idle, "stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.is_running()
    }

    pub fn robot(&self, name: &str) -> Option<Arc<Robot>> {
        self.inner.robots.get(name)
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Robot>>> {
        self.inner.robots.snapshot()
    }

    pub fn robots(&self) -> MirrorStream<Robot> {
        MirrorStream::new(self.inner.robots.subscribe())
    }

    /// Robots reporting `Available`. Zero while the roster is not in sync.
    pub fn available_count(&self) -> usize {
        if self.inner.sync.state() != SyncState::InSync {
            return 0;
        }
        self.inner
            .robots
            .snapshot()
            .iter()
            .filter(|r| r.status == QueueStatus::Available)
            .count()
    }

    /// Robots in any other state. Zero while the roster is not in sync.
    pub fn unavailable_count(&self) -> usize {
        if self.inner.sync.state() != SyncState::InSync {
            return 0;
        }
        self.inner
            .robots
            .snapshot()
            .iter()
            .filter(|r| r.status != QueueStatus::Available)
            .count()
    }

    /// Round trip of the last answered poll.
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

impl RobotInner {
    fn handle(&self, line: &RobotLine) {
        match line {
            RobotLine::Robot(robot) => {
                self.robots.upsert(robot.name.clone(), robot.clone());
                self.heartbeat.beat();
            }
            RobotLine::EndOfList => {
                self.heartbeat.beat();
                if self.sync.state() != SyncState::InSync {
                    self.sync.set(SyncState::InSync, "EndQueueShowRobot");
                }
            }
        }
    }
}

async fn event_task(
    inner: Arc<RobotInner>,
    mut events: broadcast::Receiver<Arc<ArclEvent>>,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        match next_event(RobotInner::NAME, &mut events, &mut state, &cancel).await {
            Feed::Event(event) => match event.as_ref() {
                ArclEvent::Robot(line) => inner.handle(line),
                ArclEvent::Malformed(e) => debug!(error = %e, "skipping malformed robot line"),
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
