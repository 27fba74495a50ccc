// ── Engine ──
//
// Owns one `Connection` and the six managers built on it. `connect()`
// logs in, `start_all()` starts every manager with its configured
// cadence, `shutdown()` stops them all and disconnects.

use std::sync::Arc;

use arcl_api::{Command, Connection, ConnectionState};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::manager::{
    ConfigSectionManager, ExtIoManager, JobQueueManager, RangeDeviceManager, RobotManager,
    StatusManager,
};

/// Client engine for one ARCL server.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    connection: Connection,
    jobs: JobQueueManager,
    robots: RobotManager,
    status: StatusManager,
    range: RangeDeviceManager,
    extio: ExtIoManager,
    config_sections: ConfigSectionManager,
}

impl Engine {
    /// Build the engine. Does NOT connect -- call [`connect()`](Self::connect).
    pub fn new(config: EngineConfig) -> Self {
        let connection = Connection::new();
        let extio = ExtIoManager::new(
            connection.clone(),
            config.desired_io.clone(),
            config.extio_redump_delay,
        );
        Self {
            inner: Arc::new(EngineInner {
                jobs: JobQueueManager::new(connection.clone()),
                robots: RobotManager::new(connection.clone()),
                status: StatusManager::new(connection.clone()),
                range: RangeDeviceManager::new(connection.clone()),
                config_sections: ConfigSectionManager::new(connection.clone()),
                extio,
                connection,
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    pub async fn connect(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        self.inner
            .connection
            .connect(&config.connection, config.timeout)
            .await?;
        info!(addr = %config.connection.socket_addr(), "engine connected");
        Ok(())
    }

    /// Start every manager. Stops whatever already started if one fails.
    pub async fn start_all(&self) -> Result<(), CoreError> {
        let result = self.try_start_all().await;
        if let Err(ref e) = result {
            warn!(error = %e, "start failed, stopping managers");
            self.stop_all().await;
        }
        result
    }

    async fn try_start_all(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let config = &inner.config;
        inner.jobs.start().await?;
        inner.robots.start(config.robot_poll_interval).await?;
        inner.status.start(config.status_poll_interval).await?;
        inner.range.start(config.range_poll_interval).await?;
        inner.extio.start(config.extio_poll_interval).await?;
        inner.config_sections.start().await?;
        Ok(())
    }

    pub async fn stop_all(&self) {
        let inner = &self.inner;
        inner.config_sections.stop().await;
        inner.extio.stop().await;
        inner.range.stop().await;
        inner.status.stop().await;
        inner.robots.stop().await;
        inner.jobs.stop().await;
    }

    /// Stop every manager, then close the connection.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.inner.connection.disconnect().await;
        info!("engine shut down");
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Write a fire-and-forget command such as `goto` or `dock`.
    pub async fn send(&self, command: &Command) -> Result<(), CoreError> {
        self.inner.connection.send(command).await.map_err(Into::into)
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe_state()
    }

    pub fn jobs(&self) -> &JobQueueManager {
        &self.inner.jobs
    }

    pub fn robots(&self) -> &RobotManager {
        &self.inner.robots
    }

    pub fn status(&self) -> &StatusManager {
        &self.inner.status
    }

    pub fn range_devices(&self) -> &RangeDeviceManager {
        &self.inner.range
    }

    pub fn extio(&self) -> &ExtIoManager {
        &self.inner.extio
    }

    pub fn config_sections(&self) -> &ConfigSectionManager {
        &self.inner.config_sections
    }
}
