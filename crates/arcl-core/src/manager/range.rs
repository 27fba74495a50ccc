// ── Range device manager ──
//
// Lists the robot's range devices once, then polls current and
// cumulative readings for each of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arcl_api::{
    ArclEvent, Category, Command, Connection, ConnectionState, RangeDeviceLine, RangeReading,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;
use crate::heartbeat::{Heartbeat, Polled, poll_task};
use crate::model::RangeDevice;
use crate::store::Mirror;
use crate::stream::MirrorStream;
use crate::sync::{SyncState, SyncStatus, SyncTracker};
use crate::worker::{Feed, Worker, next_event};

#[derive(Clone)]
pub struct RangeDeviceManager {
    inner: Arc<RangeInner>,
}

struct RangeInner {
    connection: Connection,
    devices: Mirror<RangeDevice>,
    /// Set once `EndOfRangeDeviceList` arrives; polling starts then.
    listed: AtomicBool,
    sync: SyncTracker,
    heartbeat: Heartbeat,
    worker: Worker,
}

impl Polled for RangeInner {
    const NAME: &'static str = "range devices";

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
        if !self.listed.load(Ordering::Acquire) {
            return Vec::new();
        }
        let mut names = self.devices.keys();
        names.sort_unstable();
        names
            .into_iter()
            .flat_map(|name| {
                [
                    Command::RangeDeviceGetCurrent(name.clone()),
                    Command::RangeDeviceGetCumulative(name),
                ]
            })
            .collect()
    }
}

impl RangeDeviceManager {
    pub fn new(connection: Connection) -> Self {
        Self {
            inner: Arc::new(RangeInner {
                connection,
                devices: Mirror::new(),
                listed: AtomicBool::new(false),
                sync: SyncTracker::new(RangeInner::NAME),
                heartbeat: Heartbeat::default(),
                worker: Worker::default(),
            }),
        }
    }

    /// Request the device list, then poll readings every `period`.
    pub async fn start(&self, period: Duration) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        let cancel = inner.worker.begin(RangeInner::NAME).await?;
        inner.devices.clear();
        inner.listed.store(false, Ordering::Release);
        inner.sync.set(SyncState::Syncing, "rangeDeviceList");

        // One task per category keeps per-category ordering.
        for category in [
            Category::RangeDevice,
            Category::RangeCurrent,
            Category::RangeCumulative,
        ] {
            let events = inner.connection.subscribe(category);
            let state = inner.connection.subscribe_state();
            inner
                .worker
                .spawn(event_task(Arc::clone(inner), events, state, cancel.clone()))
                .await;
        }

        if let Err(e) = inner.connection.send(&Command::RangeDeviceList).await {
            self.stop().await;
            return Err(e.into());
        }

        inner
            .worker
            .spawn(poll_task(Arc::clone(inner), period, cancel))
            .await;
        Ok(())
    }

    pub async fn stop(&self) {
        self.inner.worker.stop().await;
        self.inner.devices.clear();
        self.inner.listed.store(false, Ordering::Release);
        self.inner.sync.set(SyncState::Idle, "stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.is_running()
    }

    pub fn device(&self, name: &str) -> Option<Arc<RangeDevice>> {
        self.inner.devices.get(name)
    }

    pub fn device_names(&self) -> Vec<String> {
        let mut names = self.inner.devices.keys();
        names.sort_unstable();
        names
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<RangeDevice>>> {
        self.inner.devices.snapshot()
    }

    pub fn devices(&self) -> MirrorStream<RangeDevice> {
        MirrorStream::new(self.inner.devices.subscribe())
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

impl RangeInner {
    fn handle_device(&self, line: &RangeDeviceLine) {
        match line {
            RangeDeviceLine::Device(info) => {
                let device = RangeDevice::from_info(info.clone());
                self.devices.merge(&info.name, |slot| match slot {
                    Some(existing) => {
                        existing.location_type = device.location_type;
                        existing.laser_index = device.laser_index;
                    }
                    None => *slot = Some(device),
                });
            }
            RangeDeviceLine::CurrentDrawing { name, data } => {
                self.devices.update(name, |d| d.current_drawing = Some(*data));
            }
            RangeDeviceLine::CumulativeDrawing { name, data } => {
                self.devices.update(name, |d| d.cumulative_drawing = Some(*data));
            }
            RangeDeviceLine::EndOfList => {
                self.listed.store(true, Ordering::Release);
                debug!(devices = self.devices.len(), "range device list complete");
                if self.sync.state() != SyncState::InSync {
                    self.sync.set(SyncState::InSync, "EndOfRangeDeviceList");
                }
            }
        }
    }

    fn handle_reading(&self, reading: &RangeReading) {
        let name = reading.name.clone();
        if self.devices.update(&name, |d| d.apply_reading(reading.clone())) {
            self.heartbeat.beat();
        } else {
            debug!(device = %name, kind = %reading.kind, "reading for unknown range device");
        }
    }
}

async fn event_task(
    inner: Arc<RangeInner>,
    mut events: broadcast::Receiver<Arc<ArclEvent>>,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        match next_event(RangeInner::NAME, &mut events, &mut state, &cancel).await {
            Feed::Event(event) => match event.as_ref() {
                ArclEvent::RangeDevice(line) => inner.handle_device(line),
                ArclEvent::RangeCurrent(reading) | ArclEvent::RangeCumulative(reading) => {
                    inner.handle_reading(reading);
                }
                ArclEvent::Malformed(e) => debug!(error = %e, "skipping malformed range line"),
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
