// ── Robot roster lines ──
//
// QueueRobot: "<name>" <status> <substatus> <echo>
// EndQueueShowRobot

use serde::{Deserialize, Serialize};

use super::{Fields, QueueStatus, SubStatus, starts_with_ci, unquote};
use crate::dispatch::Category;
use crate::error::ParseError;

/// One robot as reported by `queueShowRobot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotUpdate {
    pub name: String,
    pub status: QueueStatus,
    pub sub_status: SubStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotLine {
    Robot(RobotUpdate),
    EndOfList,
}

pub fn parse(line: &str) -> Result<RobotLine, ParseError> {
    if starts_with_ci(line, "EndQueue") {
        return Ok(RobotLine::EndOfList);
    }

    let fields = Fields::new(Category::Robot, line);
    fields.require(4)?;

    Ok(RobotLine::Robot(RobotUpdate {
        name: unquote(fields.get(1)?),
        status: fields.parse(2, "robot status")?,
        sub_status: fields.get(3)?.parse().unwrap_or_default(),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_robot_line() {
        let RobotLine::Robot(r) = parse(r#"QueueRobot: "21" Available Available "" "#).unwrap() else {
            panic!("expected robot");
        };
        assert_eq!(r.name, "21");
        assert_eq!(r.status, QueueStatus::Available);
        assert_eq!(r.sub_status, SubStatus::Available);
    }

    #[test]
    fn unknown_sub_status_keeps_raw_text() {
        let RobotLine::Robot(r) = parse(r#"QueueRobot: "7" InProgress ChargingAtDock """#).unwrap() else {
            panic!("expected robot");
        };
        assert_eq!(r.sub_status, SubStatus::CustomUser("ChargingAtDock".into()));
    }

    #[test]
    fn unknown_status_is_a_parse_error() {
        let err = parse(r#"QueueRobot: "7" Sleeping None """#).unwrap_err();
        assert_eq!(err.category, Category::Robot);
    }

    #[test]
    fn end_marker() {
        assert_eq!(parse("EndQueueShowRobot").unwrap(), RobotLine::EndOfList);
    }
}
