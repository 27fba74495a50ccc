// ── Message grammar ──
//
// Pure line parsers, one submodule per category. Every parser takes a
// single trimmed line and returns a typed record or a `ParseError`.
// Nothing here does I/O or holds state.

pub mod config;
pub mod extio;
pub mod job;
pub mod range;
pub mod robot;
pub mod status;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::dispatch::Category;
use crate::error::ParseError;

pub use config::{ConfigEntry, ConfigLine};
pub use extio::ExtIoLine;
pub use job::{JobLine, Segment, SegmentType};
pub use range::{DrawType, DrawingData, LocationType, RangeDeviceInfo, RangeDeviceLine, RangePoint, RangeReading, ReadingKind};
pub use robot::{RobotLine, RobotUpdate};
pub use status::{Pose, StatusSnapshot};

// ── QueueStatus ─────────────────────────────────────────────────────

/// Status of a queued segment or of a robot in the fleet queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
    strum::Display,
)]
#[strum(ascii_case_insensitive)]
#[non_exhaustive]
pub enum QueueStatus {
    Pending,
    Available,
    #[strum(to_string = "AvailableForJobs", serialize = "AvailableForJob")]
    AvailableForJobs,
    Interrupted,
    InProgress,
    Completed,
    Cancelling,
    Cancelled,
    BeforeModify,
    InterruptedByModify,
    AfterModify,
    UnAvailable,
    Failed,
    Loading,
}

impl QueueStatus {
    /// Terminal states remove a job from the live queue.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

// ── SubStatus ───────────────────────────────────────────────────────

/// Sub-status reported next to a [`QueueStatus`].
///
/// Values this crate does not know about are kept verbatim in
/// [`SubStatus::CustomUser`] instead of failing the parse.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SubStatus {
    #[default]
    None,
    AssignedRobotOffLine,
    NoMatchingRobotForLinkedJob,
    NoMatchingRobotForOtherSegment,
    NoMatchingRobot,
    #[strum(serialize = "ID_PICKUP")]
    IdPickup,
    #[strum(serialize = "ID_DROPOFF")]
    IdDropoff,
    Available,
    #[strum(to_string = "AvailableForJobs", serialize = "AvailableForJob")]
    AvailableForJobs,
    Parking,
    Parked,
    DockParking,
    DockParked,
    UnAllocated,
    Allocated,
    BeforePickup,
    BeforeDropoff,
    BeforeEvery,
    Before,
    Buffering,
    Buffered,
    Driving,
    After,
    AfterEvery,
    AfterPickup,
    AfterDropoff,
    NotUsingEnterpriseManager,
    UnknownBatteryType,
    ForcedDocked,
    Lost,
    EStopPressed,
    Interrupted,
    InterruptedButNotYetIdle,
    OutgoingARCLConnLost,
    ModeIsLocked,
    #[strum(serialize = "Cancelled_by_MobilePlanner")]
    CancelledByMobilePlanner,
    #[strum(default)]
    CustomUser(String),
}

impl SubStatus {
    /// The token as it appeared on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CustomUser(raw) => raw.as_str(),
            known => <&'static str>::from(known),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::CustomUser(_))
    }
}

impl fmt::Display for SubStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Case-insensitive ASCII prefix test.
pub(crate) fn starts_with_ci(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

pub(crate) fn unquote(token: &str) -> String {
    token.replace('"', "")
}

/// Whitespace-split view of one line with typed, category-aware accessors.
pub(crate) struct Fields<'a> {
    category: Category,
    line: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(category: Category, line: &'a str) -> Self {
        Self {
            category,
            line,
            tokens: line.split_whitespace().collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn tokens(&self) -> &[&'a str] {
        &self.tokens
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError::new(self.category, self.line, reason)
    }

    pub(crate) fn require(&self, min: usize) -> Result<(), ParseError> {
        if self.tokens.len() < min {
            return Err(self.error(format!(
                "expected at least {min} fields, got {}",
                self.tokens.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn get(&self, idx: usize) -> Result<&'a str, ParseError> {
        self.tokens
            .get(idx)
            .copied()
            .ok_or_else(|| self.error(format!("missing field {idx}")))
    }

    pub(crate) fn parse<T: FromStr>(&self, idx: usize, what: &str) -> Result<T, ParseError> {
        let raw = self.get(idx)?;
        raw.parse()
            .map_err(|_| self.error(format!("could not parse {raw:?} as {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_parses_case_insensitively() {
        assert_eq!("inprogress".parse::<QueueStatus>(), Ok(QueueStatus::InProgress));
        assert_eq!("AvailableForJob".parse::<QueueStatus>(), Ok(QueueStatus::AvailableForJobs));
        assert!("Sleeping".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn unknown_sub_status_degrades_to_custom_user() {
        let sub: SubStatus = "WaitingForElevator".parse().unwrap_or_default();
        assert_eq!(sub, SubStatus::CustomUser("WaitingForElevator".into()));
        assert_eq!(sub.as_str(), "WaitingForElevator");
    }

    #[test]
    fn sub_status_keeps_wire_spelling() {
        let sub: SubStatus = "Cancelled_by_MobilePlanner".parse().unwrap_or_default();
        assert_eq!(sub, SubStatus::CancelledByMobilePlanner);
        assert_eq!(sub.to_string(), "Cancelled_by_MobilePlanner");
        assert_eq!(SubStatus::Driving.to_string(), "Driving");
    }

    #[test]
    fn prefix_match_ignores_case() {
        assert!(starts_with_ci("queueshow: x", "QueueShow"));
        assert!(!starts_with_ci("Queue", "QueueShow"));
    }
}
