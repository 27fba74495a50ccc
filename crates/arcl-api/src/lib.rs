// arcl-api: Async line-protocol client for ARCL robot and fleet servers

pub mod codec;
pub mod command;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod grammar;
pub mod settings;

// ── Primary re-exports ──────────────────────────────────────────────
pub use codec::ArclCodec;
pub use command::{CancelBy, Command, GoalRequest, ModifyField};
pub use connection::{Connection, ConnectionState};
pub use dispatch::{ArclEvent, Category, EventBus, classify, parse_line};
pub use error::{Error, ParseError};
pub use settings::ConnectionSettings;

pub use grammar::{
    // Job queue
    JobLine, QueueStatus, Segment, SegmentType, SubStatus,
    // Robots / status
    Pose, RobotLine, RobotUpdate, StatusSnapshot,
    // Config
    ConfigEntry, ConfigLine,
    // External I/O
    ExtIoLine,
    // Range devices
    DrawType, DrawingData, LocationType, RangeDeviceInfo, RangeDeviceLine, RangePoint,
    RangeReading, ReadingKind,
};
