// ── Engine configuration ──
//
// Describes how to reach one ARCL server and how the managers poll it.
// These types never touch disk -- `arcl-config` builds them from profiles.

use std::time::Duration;

use arcl_api::ConnectionSettings;
use serde::{Deserialize, Serialize};

/// Default poll cadence shared by all polling managers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Time the server needs to materialise freshly added I/O sets.
pub const DEFAULT_EXTIO_REDUMP_DELAY: Duration = Duration::from_secs(10);

/// Bound applied to `modify_segment`, `cancel_job` and section reads.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One external I/O set the engine should make sure exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtIoSpec {
    pub name: String,
    /// Number of input bits.
    pub inputs: u32,
    /// Number of output bits.
    pub outputs: u32,
}

impl ExtIoSpec {
    pub fn new(name: impl Into<String>, inputs: u32, outputs: u32) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }
}

/// Runtime settings for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub connection: ConnectionSettings,
    /// Bounds the TCP connect and, separately, the login handshake.
    pub timeout: Duration,
    pub robot_poll_interval: Duration,
    pub status_poll_interval: Duration,
    pub range_poll_interval: Duration,
    pub extio_poll_interval: Duration,
    pub extio_redump_delay: Duration,
    pub wait_timeout: Duration,
    pub desired_io: Vec<ExtIoSpec>,
}

impl EngineConfig {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self {
            connection,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            robot_poll_interval: DEFAULT_POLL_INTERVAL,
            status_poll_interval: DEFAULT_POLL_INTERVAL,
            range_poll_interval: DEFAULT_POLL_INTERVAL,
            extio_poll_interval: DEFAULT_POLL_INTERVAL,
            extio_redump_delay: DEFAULT_EXTIO_REDUMP_DELAY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            desired_io: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_desired_io(mut self, desired: Vec<ExtIoSpec>) -> Self {
        self.desired_io = desired;
        self
    }
}
