// ── Line classification and fan-out ──
//
// Every inbound line is classified by prefix into at most one category,
// parsed by that category's grammar, and published on the category's own
// broadcast channel. Lines that match no category are dropped.

use std::sync::Arc;

use strum::EnumCount;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::grammar::{
    self, ConfigLine, ExtIoLine, JobLine, RangeDeviceLine, RangeReading, ReadingKind, RobotLine,
    StatusSnapshot, starts_with_ci,
};

const BUS_CAPACITY: usize = 1024;

/// Routing target for an inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, EnumCount)]
pub enum Category {
    Robot,
    Job,
    ExtIo,
    Config,
    Status,
    RangeCurrent,
    RangeCumulative,
    RangeDevice,
}

impl Category {
    fn index(self) -> usize {
        match self {
            Self::Robot => 0,
            Self::Job => 1,
            Self::ExtIo => 2,
            Self::Config => 3,
            Self::Status => 4,
            Self::RangeCurrent => 5,
            Self::RangeCumulative => 6,
            Self::RangeDevice => 7,
        }
    }
}

/// Classify one trimmed line. First match wins; the order below is the
/// routing precedence.
pub fn classify(line: &str) -> Option<Category> {
    let any = |prefixes: &[&str]| prefixes.iter().any(|p| starts_with_ci(line, p));

    if any(&["QueueRobot", "EndQueueShowRobot"]) {
        return Some(Category::Robot);
    }
    if any(&["QueueShow", "EndQueueShow", "QueueUpdate", "QueueMulti", "EndQueueMulti"]) {
        return Some(Category::Job);
    }
    if any(&["ExtIO", "EndExtIO"]) && !line.contains("Needed") {
        return Some(Category::ExtIo);
    }
    if any(&[
        "GetConfigSection",
        "EndOfGetConfigSection",
        "Configuration changed",
        "CommandError: getconfigsection",
    ]) {
        return Some(Category::Config);
    }
    if any(&["Status:"]) {
        return Some(Category::Status);
    }
    if any(&["RangeDeviceGetCurrent:"]) {
        return Some(Category::RangeCurrent);
    }
    if any(&["RangeDeviceGetCumulative:"]) {
        return Some(Category::RangeCumulative);
    }
    if any(&["RangeDevice", "EndOfRangeDeviceList"]) {
        return Some(Category::RangeDevice);
    }
    None
}

// ── Events ──────────────────────────────────────────────────────────

/// A parsed inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum ArclEvent {
    Robot(RobotLine),
    Job(JobLine),
    ExtIo(ExtIoLine),
    Config(ConfigLine),
    Status(StatusSnapshot),
    RangeCurrent(RangeReading),
    RangeCumulative(RangeReading),
    RangeDevice(RangeDeviceLine),
    /// The line matched a category but failed to parse.
    Malformed(ParseError),
}

impl ArclEvent {
    pub fn category(&self) -> Category {
        match self {
            Self::Robot(_) => Category::Robot,
            Self::Job(_) => Category::Job,
            Self::ExtIo(_) => Category::ExtIo,
            Self::Config(_) => Category::Config,
            Self::Status(_) => Category::Status,
            Self::RangeCurrent(_) => Category::RangeCurrent,
            Self::RangeCumulative(_) => Category::RangeCumulative,
            Self::RangeDevice(_) => Category::RangeDevice,
            Self::Malformed(e) => e.category,
        }
    }
}

/// Classify and parse one line. `None` means the line belongs to no category.
pub fn parse_line(line: &str) -> Option<ArclEvent> {
    let category = classify(line)?;
    let parsed = match category {
        Category::Robot => grammar::robot::parse(line).map(ArclEvent::Robot),
        Category::Job => grammar::job::parse(line).map(ArclEvent::Job),
        Category::ExtIo => grammar::extio::parse(line).map(ArclEvent::ExtIo),
        Category::Config => grammar::config::parse(line).map(ArclEvent::Config),
        Category::Status => grammar::status::parse(line).map(ArclEvent::Status),
        Category::RangeCurrent => {
            grammar::range::parse_reading(line, ReadingKind::Current).map(ArclEvent::RangeCurrent)
        }
        Category::RangeCumulative => grammar::range::parse_reading(line, ReadingKind::Cumulative)
            .map(ArclEvent::RangeCumulative),
        Category::RangeDevice => grammar::range::parse_device(line).map(ArclEvent::RangeDevice),
    };
    Some(parsed.unwrap_or_else(ArclEvent::Malformed))
}

// ── EventBus ────────────────────────────────────────────────────────

/// One broadcast channel per category. Each channel preserves arrival
/// order; nothing is promised across channels.
#[derive(Debug)]
pub struct EventBus {
    channels: [broadcast::Sender<Arc<ArclEvent>>; Category::COUNT],
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| broadcast::channel(BUS_CAPACITY).0),
        }
    }

    fn sender(&self, category: Category) -> &broadcast::Sender<Arc<ArclEvent>> {
        &self.channels[category.index()]
    }

    pub fn subscribe(&self, category: Category) -> broadcast::Receiver<Arc<ArclEvent>> {
        self.sender(category).subscribe()
    }

    /// Publish to the event's category. Returns the number of receivers.
    pub fn publish(&self, event: ArclEvent) -> usize {
        let category = event.category();
        if let ArclEvent::Malformed(ref err) = event {
            debug!(%category, reason = %err.reason, line = %err.line, "malformed line");
        }
        self.sender(category).send(Arc::new(event)).unwrap_or(0)
    }

    /// Classify, parse and publish a raw line.
    pub fn dispatch(&self, line: &str) -> Option<Category> {
        let Some(event) = parse_line(line) else {
            debug!(line, "dropping unclassified line");
            return None;
        };
        let category = event.category();
        trace!(%category, line, "dispatching");
        self.publish(event);
        Some(category)
    }
}
