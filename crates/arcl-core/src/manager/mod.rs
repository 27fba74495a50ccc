// ── Sync managers ──
//
// One manager per mirrored concern. Each owns its mirror, its sync state
// and its background tasks; all share the same `Connection`.

mod config_sections;
mod extio;
mod job_queue;
mod range;
mod robots;
mod status;

pub use config_sections::ConfigSectionManager;
pub use extio::ExtIoManager;
pub use job_queue::JobQueueManager;
pub use range::RangeDeviceManager;
pub use robots::RobotManager;
pub use status::StatusManager;
