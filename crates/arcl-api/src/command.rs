// ── Command API ──
//
// Every outbound line is a `Command` variant. `Display` renders the exact
// wire text, without the line terminator (the codec adds it).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grammar::extio::bytes_to_hex;
use crate::grammar::{ConfigEntry, QueueStatus, SegmentType};

/// One goal of a `QueueMulti` submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRequest {
    pub goal: String,
    pub segment_type: SegmentType,
    pub priority: i32,
}

impl GoalRequest {
    pub fn pickup(goal: impl Into<String>, priority: i32) -> Self {
        Self {
            goal: goal.into(),
            segment_type: SegmentType::Pickup,
            priority,
        }
    }

    pub fn dropoff(goal: impl Into<String>, priority: i32) -> Self {
        Self {
            goal: goal.into(),
            segment_type: SegmentType::Dropoff,
            priority,
        }
    }
}

/// Field changed by `queueModify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModifyField {
    Goal,
    Priority,
}

/// Selector used by `queueCancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CancelBy {
    Id,
    JobId,
    Goal,
    RobotName,
    Status,
}

/// All lines this client writes to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Job queue ────────────────────────────────────────────────────
    QueueShow,
    QueueShowStatus(QueueStatus),
    QueueMulti {
        goals: Vec<GoalRequest>,
        job_id: Option<String>,
    },
    QueueModify {
        id: String,
        field: ModifyField,
        value: String,
    },
    QueueCancel {
        by: CancelBy,
        value: String,
    },

    // ── Polls ────────────────────────────────────────────────────────
    QueueShowRobot,
    OneLineStatus,

    // ── Config ───────────────────────────────────────────────────────
    GetConfigSectionList,
    GetConfigSectionValues(String),
    ConfigStart,
    ConfigSection(String),
    ConfigAdd {
        entry: ConfigEntry,
        value_first: bool,
    },
    ConfigParse,

    // ── External I/O ─────────────────────────────────────────────────
    ExtIoDump,
    ExtIoAdd {
        name: String,
        inputs: u32,
        outputs: u32,
    },
    ExtIoInputUpdate {
        name: String,
        bytes: Vec<u8>,
    },
    ExtIoOutputUpdate {
        name: String,
        bytes: Vec<u8>,
    },

    // ── Range devices ────────────────────────────────────────────────
    RangeDeviceList,
    RangeDeviceGetCurrent(String),
    RangeDeviceGetCumulative(String),

    // ── Motion and I/O ───────────────────────────────────────────────
    Goto(String),
    GotoPoint { x: i64, y: i64, heading: i64 },
    Go,
    Patrol(String),
    PatrolOnce(String),
    Say(String),
    Stop,
    Dock,
    Undock,
    LocalizeToPoint { x: i64, y: i64, heading: i64 },
    OutputOn(String),
    OutputOff(String),
}

impl Command {
    /// Verb used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueueShow | Self::QueueShowStatus(_) => "queueShow",
            Self::QueueMulti { .. } => "queueMulti",
            Self::QueueModify { .. } => "queueModify",
            Self::QueueCancel { .. } => "queueCancel",
            Self::QueueShowRobot => "queueShowRobot",
            Self::OneLineStatus => "onelinestatus",
            Self::GetConfigSectionList => "getconfigsectionlist",
            Self::GetConfigSectionValues(_) => "getconfigsectionvalues",
            Self::ConfigStart => "configStart",
            Self::ConfigSection(_) | Self::ConfigAdd { .. } => "configAdd",
            Self::ConfigParse => "configParse",
            Self::ExtIoDump => "extIODump",
            Self::ExtIoAdd { .. } => "extIOAdd",
            Self::ExtIoInputUpdate { .. } => "extIOInputUpdate",
            Self::ExtIoOutputUpdate { .. } => "extIOOutputUpdate",
            Self::RangeDeviceList => "rangeDeviceList",
            Self::RangeDeviceGetCurrent(_) => "rangeDeviceGetCurrent",
            Self::RangeDeviceGetCumulative(_) => "rangeDeviceGetCumulative",
            Self::Goto(_) => "goto",
            Self::GotoPoint { .. } => "gotoPoint",
            Self::Go => "go",
            Self::Patrol(_) => "patrol",
            Self::PatrolOnce(_) => "patrolOnce",
            Self::Say(_) => "say",
            Self::Stop => "stop",
            Self::Dock => "dock",
            Self::Undock => "undock",
            Self::LocalizeToPoint { .. } => "localizeToPoint",
            Self::OutputOn(_) => "outputOn",
            Self::OutputOff(_) => "outputOff",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueShow => f.write_str("QueueShow"),
            Self::QueueShowStatus(status) => write!(f, "queueShow status {status}"),
            Self::QueueMulti { goals, job_id } => {
                // Each goal is its name followed by 2 fields: type, priority.
                write!(f, "QueueMulti {} 2", goals.len())?;
                for g in goals {
                    write!(f, " {} {} {}", g.goal, g.segment_type, g.priority)?;
                }
                if let Some(job) = job_id.as_deref().filter(|j| !j.is_empty()) {
                    write!(f, " {job}")?;
                }
                Ok(())
            }
            Self::QueueModify { id, field, value } => write!(f, "queueModify {id} {field} {value}"),
            Self::QueueCancel { by, value } => write!(f, "queueCancel {by} {value}"),

            Self::QueueShowRobot => f.write_str("queueShowRobot"),
            Self::OneLineStatus => f.write_str("onelinestatus"),

            Self::GetConfigSectionList => f.write_str("getconfigsectionlist"),
            Self::GetConfigSectionValues(section) => write!(f, "getconfigsectionvalues {section}"),
            Self::ConfigStart => f.write_str("configStart"),
            Self::ConfigSection(section) => write!(f, "configAdd Section {section}"),
            Self::ConfigAdd { entry, value_first } => {
                f.write_str("configAdd")?;
                let (first, second) = if *value_first {
                    (&entry.value, &entry.name)
                } else {
                    (&entry.name, &entry.value)
                };
                for part in [first, second] {
                    if !part.is_empty() {
                        write!(f, " {part}")?;
                    }
                }
                Ok(())
            }
            Self::ConfigParse => f.write_str("configParse"),

            Self::ExtIoDump => f.write_str("extIODump"),
            Self::ExtIoAdd {
                name,
                inputs,
                outputs,
            } => write!(f, "extIOAdd {name} {inputs} {outputs}"),
            Self::ExtIoInputUpdate { name, bytes } => {
                write!(f, "extIOInputUpdate {name} {}", bytes_to_hex(bytes))
            }
            Self::ExtIoOutputUpdate { name, bytes } => {
                write!(f, "extIOOutputUpdate {name} {}", bytes_to_hex(bytes))
            }

            Self::RangeDeviceList => f.write_str("rangeDeviceList"),
            Self::RangeDeviceGetCurrent(name) => write!(f, "rangeDeviceGetCurrent {name}"),
            Self::RangeDeviceGetCumulative(name) => write!(f, "rangeDeviceGetCumulative {name}"),

            Self::Goto(goal) => write!(f, "goto {goal}"),
            Self::GotoPoint { x, y, heading } => write!(f, "gotoPoint {x} {y} {heading}"),
            Self::Go => f.write_str("go"),
            Self::Patrol(route) => write!(f, "patrol {route}"),
            Self::PatrolOnce(route) => write!(f, "patrolOnce {route}"),
            Self::Say(text) => write!(f, "say {text}"),
            Self::Stop => f.write_str("stop"),
            Self::Dock => f.write_str("dock"),
            Self::Undock => f.write_str("undock"),
            Self::LocalizeToPoint { x, y, heading } => {
                write!(f, "localizeToPoint {x} {y} {heading}")
            }
            Self::OutputOn(name) => write!(f, "outputOn {name}"),
            Self::OutputOff(name) => write!(f, "outputOff {name}"),
        }
    }
}
