// ── Job queue lines ──
//
// QueueShow: <id> <jobId> <priority> <status> <substatus> Goal <"goal"> <"robot">
//            <started date> <started time> <completed date> <completed time> <echo> <failCount>
// QueueUpdate: same layout without the echo field.
// QueueMulti: goal "<goal>" with priority <p> id <id> and job_id <jobId> successfully queued

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Fields, QueueStatus, SubStatus, starts_with_ci, unquote};
use crate::dispatch::Category;
use crate::error::ParseError;

const DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
const QUEUE_SHOW_FIELDS: usize = 15;
const QUEUE_UPDATE_FIELDS: usize = 14;
const QUEUE_MULTI_FIELDS: usize = 13;

/// Whether a segment picks up or drops off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SegmentType {
    Pickup,
    Dropoff,
}

impl SegmentType {
    /// Split a segment id such as `PICKUP12` into its type and order.
    pub fn from_segment_id(id: &str) -> Option<(Self, u32)> {
        let (kind, digits) = if let Some(rest) = id.strip_prefix("PICKUP") {
            (Self::Pickup, rest)
        } else if let Some(rest) = id.strip_prefix("DROPOFF") {
            (Self::Dropoff, rest)
        } else {
            return None;
        };
        digits.parse().ok().map(|order| (kind, order))
    }
}

/// One segment of a queued job, as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub job_id: String,
    pub segment_type: SegmentType,
    /// Numeric suffix of the segment id.
    pub order: u32,
    pub priority: i32,
    pub status: QueueStatus,
    pub sub_status: SubStatus,
    pub goal: String,
    pub robot: String,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub fail_count: u32,
}

/// A parsed Job category line.
#[derive(Debug, Clone, PartialEq)]
pub enum JobLine {
    /// A full segment report (`QueueShow:` / `QueueUpdate:`).
    Segment(Segment),
    /// Acknowledgement of one goal from a `QueueMulti` submission.
    Queued(Segment),
    /// `EndQueueShow` or `EndQueueMulti`.
    EndOfList,
}

pub fn parse(line: &str) -> Result<JobLine, ParseError> {
    if starts_with_ci(line, "EndQueue") {
        return Ok(JobLine::EndOfList);
    }
    let fields = Fields::new(Category::Job, line);
    if starts_with_ci(line, "QueueMulti") {
        return parse_queue_multi(&fields).map(JobLine::Queued);
    }
    if starts_with_ci(line, "QueueUpdate") {
        return parse_segment(&fields, QUEUE_UPDATE_FIELDS, 13).map(JobLine::Segment);
    }
    if starts_with_ci(line, "QueueShow") {
        return parse_segment(&fields, QUEUE_SHOW_FIELDS, 14).map(JobLine::Segment);
    }
    Err(fields.error("unrecognised job line"))
}

fn segment_id(fields: &Fields<'_>, idx: usize) -> Result<(String, SegmentType, u32), ParseError> {
    let id = fields.get(idx)?;
    let (kind, order) = SegmentType::from_segment_id(id).ok_or_else(|| {
        fields.error(format!("segment id {id:?} is not PICKUPn or DROPOFFn"))
    })?;
    Ok((id.to_owned(), kind, order))
}

fn date_pair(fields: &Fields<'_>, idx: usize) -> Result<Option<NaiveDateTime>, ParseError> {
    let date = fields.get(idx)?;
    if date.eq_ignore_ascii_case("None") {
        return Ok(None);
    }
    let time = fields.get(idx + 1)?;
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), DATE_FORMAT)
        .map(Some)
        .map_err(|e| fields.error(format!("bad timestamp {date} {time}: {e}")))
}

fn parse_segment(
    fields: &Fields<'_>,
    min_fields: usize,
    fail_idx: usize,
) -> Result<Segment, ParseError> {
    fields.require(min_fields)?;

    let (id, segment_type, order) = segment_id(fields, 1)?;
    let status: QueueStatus = fields.parse(4, "queue status")?;

    // An `ID_` token here echoes the segment kind, not a sub-status.
    let raw_sub = fields.get(5)?;
    let sub_status = if raw_sub.starts_with("ID_") {
        SubStatus::None
    } else {
        raw_sub.parse().unwrap_or_default()
    };

    let started_at = date_pair(fields, 9)?;
    if started_at.is_none() {
        return Err(fields.error("segment has no start time"));
    }

    Ok(Segment {
        id,
        job_id: fields.get(2)?.to_owned(),
        segment_type,
        order,
        priority: fields.parse(3, "priority")?,
        status,
        sub_status,
        goal: unquote(fields.get(7)?),
        robot: unquote(fields.get(8)?),
        started_at,
        completed_at: date_pair(fields, 11)?,
        fail_count: fields.parse(fail_idx, "fail count")?,
    })
}

fn parse_queue_multi(fields: &Fields<'_>) -> Result<Segment, ParseError> {
    fields.require(QUEUE_MULTI_FIELDS)?;
    let (id, segment_type, order) = segment_id(fields, 7)?;

    Ok(Segment {
        id,
        job_id: fields.get(10)?.to_owned(),
        segment_type,
        order,
        priority: fields.parse(5, "priority")?,
        status: QueueStatus::Pending,
        sub_status: SubStatus::None,
        goal: unquote(fields.get(2)?),
        robot: String::new(),
        started_at: None,
        completed_at: None,
        fail_count: 0,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHOW: &str = r#"QueueShow: PICKUP3 JOB3 10 Completed None Goal "1" "21" 11/14/2012 11:49:23 11/14/2012 11:49:23 "" 0"#;

    fn segment(line: &str) -> Segment {
        match parse(line).unwrap() {
            JobLine::Segment(s) | JobLine::Queued(s) => s,
            JobLine::EndOfList => panic!("expected a segment"),
        }
    }

    #[test]
    fn parses_queue_show_segment() {
        let s = segment(SHOW);
        assert_eq!(s.id, "PICKUP3");
        assert_eq!(s.job_id, "JOB3");
        assert_eq!(s.priority, 10);
        assert_eq!(s.status, QueueStatus::Completed);
        assert_eq!(s.sub_status, SubStatus::None);
        assert_eq!(s.order, 3);
        assert_eq!(s.segment_type, SegmentType::Pickup);
        assert_eq!(s.goal, "1");
        assert_eq!(s.robot, "21");
        assert_eq!(s.fail_count, 0);
        assert_eq!(
            s.started_at.unwrap().format(DATE_FORMAT).to_string(),
            "11/14/2012 11:49:23"
        );
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn parses_queue_update_with_shorter_layout() {
        let s = segment(
            r#"QueueUpdate: DROPOFF4 JOB3 10 InProgress Driving Goal "Dock" "21" 11/14/2012 11:49:23 None None 2"#,
        );
        assert_eq!(s.segment_type, SegmentType::Dropoff);
        assert_eq!(s.order, 4);
        assert_eq!(s.sub_status, SubStatus::Driving);
        assert_eq!(s.completed_at, None);
        assert_eq!(s.fail_count, 2);
    }

    #[test]
    fn id_echo_sub_status_maps_to_none() {
        let line = SHOW.replace("Completed None", "Pending ID_PICKUP3");
        assert_eq!(segment(&line).sub_status, SubStatus::None);
    }

    #[test]
    fn unknown_sub_status_is_kept_raw() {
        let line = SHOW.replace("Completed None", "InProgress Elevator");
        assert_eq!(segment(&line).sub_status, SubStatus::CustomUser("Elevator".into()));
    }

    #[test]
    fn parses_queue_multi_acknowledgement() {
        let line = r#"QueueMulti: goal "Goal1" with priority 10 id PICKUP12 and job_id OWBQYSXSGZ successfully queued"#;
        let JobLine::Queued(s) = parse(line).unwrap() else {
            panic!("expected queued");
        };
        assert_eq!(s.goal, "Goal1");
        assert_eq!(s.priority, 10);
        assert_eq!(s.id, "PICKUP12");
        assert_eq!(s.order, 12);
        assert_eq!(s.job_id, "OWBQYSXSGZ");
        assert_eq!(s.status, QueueStatus::Pending);
    }

    #[test]
    fn end_markers() {
        assert_eq!(parse("EndQueueShow").unwrap(), JobLine::EndOfList);
        assert_eq!(parse("endqueuemulti").unwrap(), JobLine::EndOfList);
    }

    #[test]
    fn malformed_segment_id_is_a_parse_error() {
        let err = parse(&SHOW.replace("PICKUP3", "LOAD3")).unwrap_err();
        assert_eq!(err.category, Category::Job);
        assert!(err.reason.contains("LOAD3"));

        assert!(parse(&SHOW.replace("PICKUP3", "PICKUPx")).is_err());
    }

    #[test]
    fn missing_start_time_is_rejected() {
        let line = SHOW.replace("11/14/2012 11:49:23 11/14", "None None 11/14");
        assert!(parse(&line).is_err());
    }

    #[test]
    fn short_line_is_rejected() {
        assert!(parse("QueueShow: PICKUP3 JOB3 10").is_err());
    }
}
