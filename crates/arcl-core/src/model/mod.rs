// ── Mirrored domain model ──
//
// Entities held by the managers' mirrors. Each is created from a parsed
// line and mutated only by the manager that owns its mirror.

pub mod config;
pub mod extio;
pub mod job;
pub mod range;

// ── Re-exports ──────────────────────────────────────────────────────

pub use config::{ConfigSection, SECTION_HEADER, parse_sections};
pub use extio::ExtIoSet;
pub use job::{Job, JobComplete};
pub use range::RangeDevice;

/// A robot as last reported by `queueShowRobot`. Replaced wholesale on
/// every update.
pub use arcl_api::RobotUpdate as Robot;
