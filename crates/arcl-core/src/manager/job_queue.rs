// ── Job queue manager ──
//
// Mirrors the server's job queue from `QueueShow` dumps and the
// `QueueUpdate` lines that follow, and issues queue mutations.

use std::sync::Arc;
use std::time::Duration;

use arcl_api::{
    ArclEvent, CancelBy, Category, Command, Connection, ConnectionState, GoalRequest, JobLine,
    ModifyField, QueueStatus, Segment, SubStatus,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{Job, JobComplete};
use crate::store::Mirror;
use crate::stream::MirrorStream;
use crate::sync::{SyncState, SyncStatus, SyncTracker};
use crate::worker::{Feed, Worker, next_event};

const NAME: &str = "job queue";
const COMPLETION_CHANNEL_SIZE: usize = 256;

/// Mirror of the fleet job queue.
#[derive(Clone)]
pub struct JobQueueManager {
    inner: Arc<JobQueueInner>,
}

struct JobQueueInner {
    connection: Connection,
    jobs: Mirror<Job>,
    sync: SyncTracker,
    worker: Worker,
    completed: broadcast::Sender<Arc<JobComplete>>,
}

impl JobQueueManager {
    pub fn new(connection: Connection) -> Self {
        let (completed, _) = broadcast::channel(COMPLETION_CHANNEL_SIZE);
        Self {
            inner: Arc::new(JobQueueInner {
                connection,
                jobs: Mirror::new(),
                sync: SyncTracker::new(NAME),
                worker: Worker::default(),
                completed,
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Clear the mirror and request a full `QueueShow` dump.
    pub async fn start(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        let cancel = inner.worker.begin(NAME).await?;
        inner.jobs.clear();

        let events = inner.connection.subscribe(Category::Job);
        let state = inner.connection.subscribe_state();
        inner
            .worker
            .spawn(event_task(Arc::clone(inner), events, state, cancel))
            .await;

        inner.sync.set(SyncState::Syncing, "QueueShow");
        if let Err(e) = inner.connection.send(&Command::QueueShow).await {
            self.stop().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop the event task, clear the mirror and go `Idle`.
    pub async fn stop(&self) {
        self.inner.worker.stop().await;
        self.inner.jobs.clear();
        self.inner.sync.set(SyncState::Idle, "stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.is_running()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn job(&self, job_id: &str) -> Option<Arc<Job>> {
        self.inner.jobs.get(job_id)
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Job>>> {
        self.inner.jobs.snapshot()
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.inner.jobs.keys()
    }

    pub fn jobs(&self) -> MirrorStream<Job> {
        MirrorStream::new(self.inner.jobs.subscribe())
    }

    /// One event per job that left the mirror as completed or cancelled.
    pub fn completions(&self) -> broadcast::Receiver<Arc<JobComplete>> {
        self.inner.completed.subscribe()
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

    // ── Commands ─────────────────────────────────────────────────────

    /// Queue a multi-goal job. Success means the command was written;
    /// the server's acknowledgement arrives later as `QueueMulti:` lines.
    pub async fn submit_multi(
        &self,
        goals: Vec<GoalRequest>,
        job_id: Option<String>,
    ) -> Result<(), CoreError> {
        if goals.is_empty() {
            return Err(CoreError::Rejected {
                reason: "a job needs at least one goal".into(),
            });
        }
        debug!(goals = goals.len(), ?job_id, "submitting job");
        self.inner
            .connection
            .send(&Command::QueueMulti { goals, job_id })
            .await
            .map_err(Into::into)
    }

    /// Retarget a segment that has not started driving yet.
    ///
    /// Returns `false` without writing anything if the segment is unknown
    /// or already past the point where it can be changed. Otherwise waits
    /// up to `timeout` for the mirror to show the new goal.
    pub async fn modify_segment(
        &self,
        job_id: &str,
        segment_id: &str,
        goal: &str,
        timeout: Duration,
    ) -> bool {
        let modifiable = self
            .inner
            .jobs
            .get(job_id)
            .and_then(|job| job.segment(segment_id).map(is_modifiable));
        if modifiable != Some(true) {
            debug!(job_id, segment_id, "segment cannot be modified");
            return false;
        }

        let command = Command::QueueModify {
            id: segment_id.to_owned(),
            field: ModifyField::Goal,
            value: goal.to_owned(),
        };
        if let Err(e) = self.inner.connection.send(&command).await {
            warn!(job_id, segment_id, error = %e, "queueModify write failed");
            return false;
        }

        self.inner
            .jobs
            .wait_until(timeout, |jobs| {
                jobs.get(job_id)
                    .and_then(|job| job.segment(segment_id).map(|s| s.goal == goal))
                    .unwrap_or(false)
            })
            .await
    }

    /// Cancel a job and wait up to `timeout` for it to leave the mirror.
    /// An unknown job counts as already cancelled.
    pub async fn cancel_job(&self, job_id: &str, timeout: Duration) -> bool {
        if !self.inner.jobs.contains(job_id) {
            return true;
        }

        let command = Command::QueueCancel {
            by: CancelBy::JobId,
            value: job_id.to_owned(),
        };
        if let Err(e) = self.inner.connection.send(&command).await {
            warn!(job_id, error = %e, "queueCancel write failed");
            return false;
        }

        self.inner
            .jobs
            .wait_until(timeout, |jobs| !jobs.contains(job_id))
            .await
    }

    /// Ask for a refresh of every segment in `status`.
    pub async fn queue_show_status(&self, status: QueueStatus) -> Result<(), CoreError> {
        self.inner
            .connection
            .send(&Command::QueueShowStatus(status))
            .await
            .map_err(Into::into)
    }
}

/// Pending segments can always be retargeted; in-progress ones only
/// until the robot starts the leg.
fn is_modifiable(segment: &Segment) -> bool {
    match segment.status {
        QueueStatus::Pending => true,
        QueueStatus::InProgress => matches!(
            segment.sub_status,
            SubStatus::UnAllocated | SubStatus::Allocated | SubStatus::Driving
        ),
        _ => false,
    }
}

// ── Event handling ───────────────────────────────────────────────────

impl JobQueueInner {
    fn handle(&self, line: &JobLine) {
        match line {
            JobLine::EndOfList => {
                if self.sync.state() != SyncState::InSync {
                    self.sync.set(SyncState::InSync, "EndQueueShow");
                }
            }
            JobLine::Segment(segment) | JobLine::Queued(segment) => self.merge(segment),
        }
    }

    /// Fold one segment into its job. The read of the derived status and
    /// the removal happen under the same key lock.
    fn merge(&self, segment: &Segment) {
        let finished = self.jobs.merge(&segment.job_id, |slot| {
            let job = slot.get_or_insert_with(|| Job::new(segment.job_id.clone()));
            job.apply(segment.clone());
            let status = job.status();
            if status.is_terminal() {
                *slot = None;
                Some(status)
            } else {
                None
            }
        });

        if let Some(status) = finished {
            info!(job_id = %segment.job_id, %status, "job finished");
            let _ = self.completed.send(Arc::new(JobComplete {
                job_id: segment.job_id.clone(),
                status,
                segment: segment.clone(),
            }));
        }
    }
}

async fn event_task(
    inner: Arc<JobQueueInner>,
    mut events: broadcast::Receiver<Arc<ArclEvent>>,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        match next_event(NAME, &mut events, &mut state, &cancel).await {
            Feed::Event(event) => match event.as_ref() {
                ArclEvent::Job(line) => inner.handle(line),
                ArclEvent::Malformed(e) => debug!(error = %e, "skipping malformed job line"),
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
