// ── External I/O manager ──
//
// Mirrors the server's external I/O sets from `extIODump` and makes sure
// every configured set exists. Missing sets are created once, then the
// manager waits for a delayed re-dump before looking again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arcl_api::{ArclEvent, Category, Command, Connection, ConnectionState, ExtIoLine};
use indexmap::IndexMap;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExtIoSpec;
use crate::error::CoreError;
use crate::heartbeat::{Heartbeat, Polled, poll_task};
use crate::model::ExtIoSet;
use crate::store::Mirror;
use crate::stream::MirrorStream;
use crate::sync::{SyncState, SyncStatus, SyncTracker};
use crate::worker::{Feed, Worker, next_event};

#[derive(Clone)]
pub struct ExtIoManager {
    inner: Arc<ExtIoInner>,
}

struct ExtIoInner {
    connection: Connection,
    desired: IndexMap<String, ExtIoSpec>,
    redump_delay: Duration,
    sets: Mirror<ExtIoSet>,
    /// Desired sets we asked the server to create and have not seen yet.
    in_process: Mutex<HashSet<String>>,
    dump_complete: AtomicBool,
    redump_scheduled: AtomicBool,
    sync: SyncTracker,
    heartbeat: Heartbeat,
    worker: Worker,
}

impl Polled for ExtIoInner {
    const NAME: &'static str = "external io";

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
        vec![Command::ExtIoDump]
    }
}

impl ExtIoManager {
    /// `desired` is the fixed set of I/O sets this manager converges to.
    pub fn new(connection: Connection, desired: Vec<ExtIoSpec>, redump_delay: Duration) -> Self {
        let desired = desired.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            inner: Arc::new(ExtIoInner {
                connection,
                desired,
                redump_delay,
                sets: Mirror::new(),
                in_process: Mutex::new(HashSet::new()),
                dump_complete: AtomicBool::new(false),
                redump_scheduled: AtomicBool::new(false),
                sync: SyncTracker::new(ExtIoInner::NAME),
                heartbeat: Heartbeat::default(),
                worker: Worker::default(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Seed the mirror with a full dump and keep dumping every `period`.
    pub async fn start(&self, period: Duration) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        let cancel = inner.worker.begin(ExtIoInner::NAME).await?;
        inner.reset().await;
        inner.sync.set(SyncState::Syncing, "extIODump");

        let events = inner.connection.subscribe(Category::ExtIo);
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
        self.inner.reset().await;
        self.inner.sync.set(SyncState::Idle, "stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.is_running()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn set(&self, name: &str) -> Option<Arc<ExtIoSet>> {
        self.inner.sets.get(name)
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<ExtIoSet>>> {
        self.inner.sets.snapshot()
    }

    pub fn sets(&self) -> MirrorStream<ExtIoSet> {
        MirrorStream::new(self.inner.sets.subscribe())
    }

    pub fn desired(&self) -> impl Iterator<Item = &ExtIoSpec> {
        self.inner.desired.values()
    }

    /// Names of desired sets that were requested but not yet seen.
    pub async fn in_process(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.in_process.lock().await.iter().cloned().collect();
        names.sort_unstable();
        names
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

    // ── Commands ─────────────────────────────────────────────────────

    /// Create any desired set missing from the mirror. Returns `true` once
    /// every desired set exists. A set is requested at most once per
    /// detection cycle; the delayed re-dump after a create starts the next
    /// cycle, so a set the server still lacks by then is requested again.
    pub async fn reconcile(&self) -> Result<bool, CoreError> {
        self.inner.reconcile().await
    }

    /// Write the inputs of every active set. `values` must hold an entry
    /// for each set; shorter values are zero-padded to the set's width.
    pub async fn write_all_inputs(&self, values: &HashMap<String, Vec<u8>>) -> Result<(), CoreError> {
        let inner = &self.inner;
        inner.require_in_sync()?;

        let sets = inner.sets.snapshot();
        let mut commands = Vec::with_capacity(sets.len());
        for set in sets.iter() {
            let Some(value) = values.get(&set.name) else {
                return Err(CoreError::Rejected {
                    reason: format!("no input value for set {}", set.name),
                });
            };
            commands.push(Command::ExtIoInputUpdate {
                name: set.name.clone(),
                bytes: fit_width(&set.name, value, set.inputs.len())?,
            });
        }

        inner.sets.update_all(|set| set.pending_update = true);

        let mut failed = 0usize;
        for command in &commands {
            if let Err(e) = inner.connection.send(command).await {
                warn!(command = command.name(), error = %e, "input write failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(CoreError::Write {
                command: "extIOInputUpdate".into(),
                reason: format!("{failed} of {} writes failed", commands.len()),
            });
        }
        Ok(())
    }

    /// Force a fresh dump of every set.
    pub async fn read_all_outputs(&self) -> Result<(), CoreError> {
        self.inner.require_in_sync()?;
        self.inner.dump().await
    }

    /// Write the outputs of one set.
    pub async fn write_outputs(&self, name: &str, value: &[u8]) -> Result<(), CoreError> {
        let inner = &self.inner;
        let set = inner.sets.get(name).ok_or_else(|| CoreError::Rejected {
            reason: format!("unknown I/O set {name}"),
        })?;
        let bytes = fit_width(name, value, set.outputs.len())?;

        inner.sets.update(name, |set| set.pending_update = true);
        inner
            .connection
            .send(&Command::ExtIoOutputUpdate {
                name: name.to_owned(),
                bytes,
            })
            .await
            .map_err(Into::into)
    }
}

/// Zero-pad `value` to `width` bytes. Longer values are rejected.
fn fit_width(name: &str, value: &[u8], width: usize) -> Result<Vec<u8>, CoreError> {
    if value.len() > width {
        return Err(CoreError::Rejected {
            reason: format!("{} bytes do not fit set {name} ({width} bytes)", value.len()),
        });
    }
    let mut bytes = value.to_vec();
    bytes.resize(width, 0);
    Ok(bytes)
}

// ── Reconciliation and event handling ────────────────────────────────

impl ExtIoInner {
    async fn reset(&self) {
        self.sets.clear();
        self.in_process.lock().await.clear();
        self.dump_complete.store(false, Ordering::Release);
        self.redump_scheduled.store(false, Ordering::Release);
    }

    fn require_in_sync(&self) -> Result<(), CoreError> {
        if !self.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        if self.sync.state() != SyncState::InSync {
            return Err(CoreError::NotInSync { manager: Self::NAME });
        }
        if self.sets.is_empty() {
            return Err(CoreError::Rejected {
                reason: "no active I/O sets".into(),
            });
        }
        Ok(())
    }

    async fn dump(&self) -> Result<(), CoreError> {
        self.sets.update_all(|set| set.pending_update = true);
        self.connection
            .send(&Command::ExtIoDump)
            .await
            .map_err(Into::into)
    }

    async fn reconcile(self: &Arc<Self>) -> Result<bool, CoreError> {
        let mut in_process = self.in_process.lock().await;
        let mut created = 0usize;

        for spec in self.desired.values() {
            if self.sets.contains(&spec.name) {
                in_process.remove(&spec.name);
                continue;
            }
            if !in_process.insert(spec.name.clone()) {
                continue;
            }
            info!(set = %spec.name, inputs = spec.inputs, outputs = spec.outputs, "creating I/O set");
            let command = Command::ExtIoAdd {
                name: spec.name.clone(),
                inputs: spec.inputs,
                outputs: spec.outputs,
            };
            if let Err(e) = self.connection.send(&command).await {
                in_process.remove(&spec.name);
                return Err(e.into());
            }
            created += 1;
        }

        let converged = in_process.is_empty();
        drop(in_process);

        if created > 0 {
            self.schedule_redump().await;
        }
        Ok(converged)
    }

    /// Re-dump once the server has had time to create new sets. The
    /// re-dump opens a new detection cycle.
    async fn schedule_redump(self: &Arc<Self>) {
        if self.redump_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(cancel) = self.worker.token() else {
            self.redump_scheduled.store(false, Ordering::Release);
            return;
        };
        let inner = Arc::clone(self);
        let delay = self.redump_delay;
        self.worker
            .spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(delay) => {
                        let retry = std::mem::take(&mut *inner.in_process.lock().await);
                        if !retry.is_empty() {
                            debug!(sets = ?retry, "I/O sets still pending after re-dump delay");
                        }
                        inner.redump_scheduled.store(false, Ordering::Release);
                        if let Err(e) = inner.dump().await {
                            warn!(error = %e, "delayed extIODump failed");
                        }
                    }
                }
            })
            .await;
    }

    fn any_pending(&self) -> bool {
        self.sets.snapshot().iter().any(|s| s.pending_update)
    }

    async fn handle(self: &Arc<Self>, line: &ExtIoLine) {
        match line {
            ExtIoLine::Dump {
                name,
                inputs,
                outputs,
            } => {
                self.sets
                    .upsert(name.clone(), ExtIoSet::new(name.clone(), inputs.clone(), outputs.clone()));
            }
            ExtIoLine::InputUpdate { name, inputs } => {
                let known = self.sets.update(name, |set| {
                    set.inputs.clone_from(inputs);
                    set.pending_update = false;
                });
                if !known {
                    debug!(set = %name, "input update for unknown set");
                }
            }
            ExtIoLine::OutputUpdate { name, outputs } => {
                let known = self.sets.update(name, |set| {
                    set.outputs.clone_from(outputs);
                    set.pending_update = false;
                });
                if !known {
                    debug!(set = %name, "output update for unknown set");
                }
            }
            ExtIoLine::Removed { name } => {
                self.sets.remove(name);
            }
            ExtIoLine::EndOfDump => {
                self.heartbeat.beat();
                self.dump_complete.store(true, Ordering::Release);
            }
        }

        if !self.dump_complete.load(Ordering::Acquire) || self.any_pending() {
            return;
        }
        match self.reconcile().await {
            Ok(true) => {
                if self.sync.state() != SyncState::InSync {
                    self.sync.set(SyncState::InSync, "EndExtIODump");
                }
            }
            Ok(false) => {
                if self.sync.state() == SyncState::Syncing {
                    self.sync.set(SyncState::Syncing, "waiting for new I/O sets");
                }
            }
            Err(e) => warn!(error = %e, "reconcile failed"),
        }
    }
}

async fn event_task(
    inner: Arc<ExtIoInner>,
    mut events: broadcast::Receiver<Arc<ArclEvent>>,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        match next_event(ExtIoInner::NAME, &mut events, &mut state, &cancel).await {
            Feed::Event(event) => match event.as_ref() {
                ArclEvent::ExtIo(line) => inner.handle(line).await,
                ArclEvent::Malformed(e) => debug!(error = %e, "skipping malformed extIO line"),
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
