// arcl-core: Synchronised mirrors of ARCL server state, built on arcl-api.

pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
pub mod model;
pub mod stream;
pub mod sync;

mod heartbeat;
mod store;
mod worker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{EngineConfig, ExtIoSpec};
pub use controller::Engine;
pub use error::CoreError;
pub use manager::{
    ConfigSectionManager, ExtIoManager, JobQueueManager, RangeDeviceManager, RobotManager,
    StatusManager,
};
pub use stream::{MirrorStream, MirrorWatchStream};
pub use sync::{SyncState, SyncStatus};

pub use model::{ConfigSection, ExtIoSet, Job, JobComplete, RangeDevice, Robot};
