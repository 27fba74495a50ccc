// ── Config section manager ──
//
// Loads the list of config sections, reads section values one section at
// a time, and writes sections back. The wire protocol has no request ids,
// so only one section read may be in flight per connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arcl_api::{ArclEvent, Category, Command, ConfigLine, Connection, ConnectionState};
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::ConfigSection;
use crate::store::Mirror;
use crate::stream::MirrorStream;
use crate::sync::{SyncState, SyncStatus, SyncTracker};
use crate::worker::{Feed, Worker, next_event};

const NAME: &str = "config sections";
const CHANGE_CHANNEL_SIZE: usize = 16;

/// A read waiting for its terminal line.
struct InFlight {
    section: String,
    done: oneshot::Sender<bool>,
}

#[derive(Clone)]
pub struct ConfigSectionManager {
    inner: Arc<ConfigInner>,
}

struct ConfigInner {
    connection: Connection,
    sections: Mirror<ConfigSection>,
    /// Section names in the order the server listed them.
    order: Mutex<Vec<String>>,
    /// Serialises section reads.
    read_lock: Mutex<()>,
    in_flight: Mutex<Option<InFlight>>,
    /// Set while our own write is being parsed, so its echo is ignored.
    change_expected: AtomicBool,
    changes: broadcast::Sender<()>,
    sync: SyncTracker,
    worker: Worker,
}

impl ConfigSectionManager {
    pub fn new(connection: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            inner: Arc::new(ConfigInner {
                connection,
                sections: Mirror::new(),
                order: Mutex::new(Vec::new()),
                read_lock: Mutex::new(()),
                in_flight: Mutex::new(None),
                change_expected: AtomicBool::new(false),
                changes,
                sync: SyncTracker::new(NAME),
                worker: Worker::default(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Subscribe to config lines and load the section list.
    pub async fn start(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.connection.is_logged_in() {
            return Err(CoreError::NotConnected);
        }
        let cancel = inner.worker.begin(NAME).await?;

        let events = inner.connection.subscribe(Category::Config);
        let state = inner.connection.subscribe_state();
        inner
            .worker
            .spawn(event_task(Arc::clone(inner), events, state, cancel))
            .await;

        if let Err(e) = self.load_section_list().await {
            self.stop().await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn stop(&self) {
        let inner = &self.inner;
        inner.worker.stop().await;
        if let Some(pending) = inner.in_flight.lock().await.take() {
            let _ = pending.done.send(false);
        }
        inner.sections.clear();
        inner.order.lock().await.clear();
        inner.change_expected.store(false, Ordering::Release);
        inner.sync.set(SyncState::Idle, "stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.worker.is_running()
    }

    // ── Section list ─────────────────────────────────────────────────

    /// Clear the mirror and request the list of section names. Each
    /// listed section starts out empty.
    pub async fn load_section_list(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !inner.worker.is_running() {
            return Err(CoreError::NotRunning { manager: NAME });
        }
        inner.sections.clear();
        inner.order.lock().await.clear();
        inner.sync.set(SyncState::Syncing, "getconfigsectionlist");
        inner
            .connection
            .send(&Command::GetConfigSectionList)
            .await
            .map_err(Into::into)
    }

    pub async fn section_names(&self) -> Vec<String> {
        self.inner.order.lock().await.clone()
    }

    pub fn section(&self, name: &str) -> Option<Arc<ConfigSection>> {
        self.inner.sections.get(name)
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<ConfigSection>>> {
        self.inner.sections.snapshot()
    }

    pub fn sections(&self) -> MirrorStream<ConfigSection> {
        MirrorStream::new(self.inner.sections.subscribe())
    }

    // ── Section values ───────────────────────────────────────────────

    /// Read one section's values into the mirror.
    ///
    /// Reads are serialised: a second caller waits for the first to
    /// finish. `timeout` covers the wait and the read. Returns `false`
    /// on timeout or when the server reports the section as unknown.
    pub async fn read_section_values(&self, name: &str, timeout: Duration) -> bool {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;

        let Ok(_guard) = tokio::time::timeout_at(deadline, inner.read_lock.lock()).await else {
            debug!(section = name, "timed out waiting for another section read");
            return false;
        };
        if !inner.worker.is_running() {
            return false;
        }

        let (done, finished) = oneshot::channel();
        *inner.in_flight.lock().await = Some(InFlight {
            section: name.to_owned(),
            done,
        });
        inner.sections.upsert(name, ConfigSection::new(name));
        inner
            .sync
            .set(SyncState::Syncing, format!("getconfigsectionvalues {name}"));

        let sent = inner
            .connection
            .send(&Command::GetConfigSectionValues(name.to_owned()))
            .await;
        if let Err(e) = sent {
            warn!(section = name, error = %e, "section read write failed");
            inner.in_flight.lock().await.take();
            return false;
        }

        match tokio::time::timeout_at(deadline, finished).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(_)) => false,
            Err(_) => {
                inner.in_flight.lock().await.take();
                inner
                    .sync
                    .set(SyncState::Stale, format!("timed out reading {name}"));
                false
            }
        }
    }

    /// Replace the local copy of a section. Nothing is sent.
    pub async fn update_section(&self, section: ConfigSection) {
        let mut order = self.inner.order.lock().await;
        if !order.contains(&section.name) {
            order.push(section.name.clone());
        }
        self.inner.sections.upsert(section.name.clone(), section);
    }

    /// Write the mirrored section back to the server.
    pub async fn write_section_values(&self, name: &str) -> Result<(), CoreError> {
        let inner = &self.inner;
        let section = inner
            .sections
            .get(name)
            .ok_or_else(|| CoreError::UnknownSection { name: name.to_owned() })?;

        let mut commands = vec![Command::ConfigStart, Command::ConfigSection(section.name.clone())];
        commands.extend(section.write_order().map(|(entry, value_first)| Command::ConfigAdd {
            entry: entry.clone(),
            value_first,
        }));
        commands.push(Command::ConfigParse);

        inner.change_expected.store(true, Ordering::Release);
        for command in &commands {
            if let Err(e) = inner.connection.send(command).await {
                inner.change_expected.store(false, Ordering::Release);
                return Err(CoreError::Write {
                    command: command.name().into(),
                    reason: e.to_string(),
                });
            }
        }
        info!(section = name, entries = section.entries.len(), "config section written");
        Ok(())
    }

    // ── Text form ────────────────────────────────────────────────────

    pub fn section_to_text(&self, name: &str) -> Option<String> {
        self.inner.sections.get(name).map(|s| s.to_text())
    }

    /// Parse one section from its text form and store it locally.
    pub async fn text_to_section(&self, text: &str) -> Result<Arc<ConfigSection>, CoreError> {
        let section = ConfigSection::from_text(text)?;
        let name = section.name.clone();
        self.update_section(section).await;
        self.section(&name).ok_or(CoreError::UnknownSection { name })
    }

    // ── State ────────────────────────────────────────────────────────

    /// Fires when the server reports a configuration change we did not make.
    pub fn external_changes(&self) -> broadcast::Receiver<()> {
        self.inner.changes.subscribe()
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

// ── Event handling ───────────────────────────────────────────────────

impl ConfigInner {
    async fn handle(&self, line: &ConfigLine) {
        match line {
            ConfigLine::SectionName(name) => {
                if self.sections.insert_if_absent(name, || ConfigSection::new(name.clone())) {
                    self.order.lock().await.push(name.clone());
                }
            }
            ConfigLine::EndOfSectionList => {
                self.sync.set(SyncState::InSync, "EndOfGetConfigSectionList");
            }
            ConfigLine::Entry(entry) => {
                let in_flight = self.in_flight.lock().await;
                let Some(read) = in_flight.as_ref() else {
                    debug!(entry = %entry.name, "config value with no section read in flight");
                    return;
                };
                self.sections.merge(&read.section, |slot| {
                    slot.get_or_insert_with(|| ConfigSection::new(read.section.clone()))
                        .entries
                        .push(entry.clone());
                });
            }
            ConfigLine::EndOfSectionValues => {
                if let Some(read) = self.in_flight.lock().await.take() {
                    debug!(section = %read.section, "section read complete");
                    self.sync.set(SyncState::InSync, "EndOfGetConfigSectionValues");
                    let _ = read.done.send(true);
                }
            }
            ConfigLine::CommandError { section } => {
                let mut in_flight = self.in_flight.lock().await;
                let matches = in_flight
                    .as_ref()
                    .is_some_and(|read| read.section.eq_ignore_ascii_case(section));
                if !matches {
                    warn!(section = %section, "command error for a section not being read");
                    return;
                }
                if let Some(read) = in_flight.take() {
                    warn!(section = %read.section, "server rejected section read");
                    self.sections.remove(&read.section);
                    self.order.lock().await.retain(|n| n != &read.section);
                    self.sync
                        .set(SyncState::Stale, format!("getconfigsectionvalues {} failed", read.section));
                    let _ = read.done.send(false);
                }
            }
            ConfigLine::Changed => {
                if self.change_expected.swap(false, Ordering::AcqRel) {
                    debug!("configuration change echo for our own write");
                    return;
                }
                info!("configuration changed externally");
                self.sync.set(SyncState::Stale, "configuration changed");
                let _ = self.changes.send(());
            }
        }
    }
}

async fn event_task(
    inner: Arc<ConfigInner>,
    mut events: broadcast::Receiver<Arc<ArclEvent>>,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        match next_event(NAME, &mut events, &mut state, &cancel).await {
            Feed::Event(event) => match event.as_ref() {
                ArclEvent::Config(line) => inner.handle(line).await,
                ArclEvent::Malformed(e) => debug!(error = %e, "skipping malformed config line"),
                _ => {}
            },
            Feed::Cancelled => break,
            Feed::ConnectionLost => {
                if let Some(read) = inner.in_flight.lock().await.take() {
                    let _ = read.done.send(false);
                }
                inner.sync.connection_lost();
                cancel.cancel();
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use arcl_api::ConfigEntry;

    #[tokio::test]
    async fn section_list_inserts_empty_sections_once() {
        let manager = ConfigSectionManager::new(Connection::new());
        let inner = &manager.inner;
        inner.handle(&ConfigLine::SectionName("General".into())).await;
        inner.handle(&ConfigLine::SectionName("Teleop".into())).await;
        inner.handle(&ConfigLine::SectionName("General".into())).await;
        inner.handle(&ConfigLine::EndOfSectionList).await;

        assert_eq!(manager.section_names().await, vec!["General", "Teleop"]);
        assert!(manager.section("General").unwrap().entries.is_empty());
        assert_eq!(manager.sync_status().state, SyncState::InSync);
    }

    #[tokio::test]
    async fn values_accumulate_only_for_the_section_in_flight() {
        let manager = ConfigSectionManager::new(Connection::new());
        let inner = &manager.inner;
        inner
            .handle(&ConfigLine::Entry(ConfigEntry::new("Stray", "1")))
            .await;
        assert!(manager.snapshot().is_empty());

        let (done, finished) = oneshot::channel();
        *inner.in_flight.lock().await = Some(InFlight {
            section: "General".into(),
            done,
        });
        inner
            .handle(&ConfigLine::Entry(ConfigEntry::new("Radius", "40")))
            .await;
        inner
            .handle(&ConfigLine::Entry(ConfigEntry::new("Width", "500")))
            .await;
        inner.handle(&ConfigLine::EndOfSectionValues).await;

        assert!(finished.await.unwrap());
        let names: Vec<_> = manager
            .section("General")
            .unwrap()
            .entries
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, vec!["Radius", "Width"]);
    }

    #[tokio::test]
    async fn command_error_evicts_the_section() {
        let manager = ConfigSectionManager::new(Connection::new());
        let inner = &manager.inner;
        inner.handle(&ConfigLine::SectionName("Bogus".into())).await;

        let (done, finished) = oneshot::channel();
        *inner.in_flight.lock().await = Some(InFlight {
            section: "Bogus".into(),
            done,
        });
        inner
            .handle(&ConfigLine::CommandError {
                section: "bogus".into(),
            })
            .await;

        assert!(!finished.await.unwrap());
        assert!(manager.section("Bogus").is_none());
        assert!(manager.section_names().await.is_empty());
        assert_eq!(manager.sync_status().state, SyncState::Stale);
    }

    #[tokio::test]
    async fn own_change_echo_is_swallowed() {
        let manager = ConfigSectionManager::new(Connection::new());
        let mut changes = manager.external_changes();

        manager.inner.change_expected.store(true, Ordering::Release);
        manager.inner.handle(&ConfigLine::Changed).await;
        assert!(changes.try_recv().is_err());

        manager.inner.handle(&ConfigLine::Changed).await;
        assert!(changes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn write_of_unknown_section_is_rejected() {
        let manager = ConfigSectionManager::new(Connection::new());
        assert!(matches!(
            manager.write_section_values("Nope").await,
            Err(CoreError::UnknownSection { .. })
        ));
    }
}
