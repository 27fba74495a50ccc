// ── Job aggregate ──

use arcl_api::{QueueStatus, Segment};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A queued job and its segments in arrival order.
///
/// Status is derived from the segments on every read. A job with no
/// segments is never stored in a mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    segments: IndexMap<String, Segment>,
}

impl Job {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            segments: IndexMap::new(),
        }
    }

    /// Replace the segment with the same id in place, or append it.
    pub(crate) fn apply(&mut self, segment: Segment) {
        match self.segments.get_mut(&segment.id) {
            Some(existing) => *existing = segment,
            None => {
                self.segments.insert(segment.id.clone(), segment);
            }
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Lowest-order segment that has not completed.
    pub fn current_segment(&self) -> Option<&Segment> {
        self.segments
            .values()
            .filter(|s| s.status != QueueStatus::Completed)
            .min_by_key(|s| s.order)
    }

    pub fn status(&self) -> QueueStatus {
        match self.current_segment() {
            Some(segment) => segment.status,
            None if self.segments.is_empty() => QueueStatus::Loading,
            None => QueueStatus::Completed,
        }
    }

    /// Completed or cancelled jobs leave the mirror.
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Emitted once when a job leaves the mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobComplete {
    pub job_id: String,
    pub status: QueueStatus,
    /// The segment whose update finished the job.
    pub segment: Segment,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use arcl_api::{SegmentType, SubStatus};

    fn segment(id: &str, status: QueueStatus) -> Segment {
        let (segment_type, order) = SegmentType::from_segment_id(id).unwrap();
        Segment {
            id: id.into(),
            job_id: "JOB1".into(),
            segment_type,
            order,
            priority: 10,
            status,
            sub_status: SubStatus::None,
            goal: "Bay1".into(),
            robot: String::new(),
            started_at: None,
            completed_at: None,
            fail_count: 0,
        }
    }

    #[test]
    fn empty_job_is_loading() {
        assert_eq!(Job::new("JOB1").status(), QueueStatus::Loading);
    }

    #[test]
    fn status_follows_lowest_unfinished_segment() {
        let mut job = Job::new("JOB1");
        job.apply(segment("DROPOFF2", QueueStatus::Pending));
        job.apply(segment("PICKUP1", QueueStatus::InProgress));
        assert_eq!(job.status(), QueueStatus::InProgress);
        assert_eq!(job.current_segment().unwrap().id, "PICKUP1");

        job.apply(segment("PICKUP1", QueueStatus::Completed));
        assert_eq!(job.segment_count(), 2);
        assert_eq!(job.status(), QueueStatus::Pending);
        assert!(!job.is_finished());
    }

    #[test]
    fn completed_only_when_every_segment_completed() {
        let mut job = Job::new("JOB1");
        job.apply(segment("PICKUP1", QueueStatus::Completed));
        job.apply(segment("DROPOFF2", QueueStatus::InProgress));
        assert!(!job.is_finished());

        job.apply(segment("DROPOFF2", QueueStatus::Completed));
        assert_eq!(job.status(), QueueStatus::Completed);
        assert!(job.is_finished());
    }

    #[test]
    fn cancelled_current_segment_finishes_the_job() {
        let mut job = Job::new("JOB1");
        job.apply(segment("PICKUP1", QueueStatus::Cancelled));
        job.apply(segment("DROPOFF2", QueueStatus::Pending));
        assert_eq!(job.status(), QueueStatus::Cancelled);
        assert!(job.is_finished());
    }
}
