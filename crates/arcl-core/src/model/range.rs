// ── Range devices ──

use arcl_api::{DrawingData, LocationType, RangeDeviceInfo, RangeReading, ReadingKind};
use serde::{Deserialize, Serialize};

/// A laser, sonar or other range sensor and its latest readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDevice {
    pub name: String,
    pub laser_index: Option<u32>,
    pub location_type: LocationType,
    pub current_drawing: Option<DrawingData>,
    pub cumulative_drawing: Option<DrawingData>,
    pub current: Option<RangeReading>,
    pub cumulative: Option<RangeReading>,
    /// A current reading arrived during this run.
    pub current_in_sync: bool,
    pub cumulative_in_sync: bool,
}

impl RangeDevice {
    pub fn from_info(info: RangeDeviceInfo) -> Self {
        Self {
            name: info.name,
            laser_index: info.laser_index,
            location_type: info.location_type,
            current_drawing: None,
            cumulative_drawing: None,
            current: None,
            cumulative: None,
            current_in_sync: false,
            cumulative_in_sync: false,
        }
    }

    pub(crate) fn apply_reading(&mut self, reading: RangeReading) {
        match reading.kind {
            ReadingKind::Current => {
                self.current = Some(reading);
                self.current_in_sync = true;
            }
            ReadingKind::Cumulative => {
                self.cumulative = Some(reading);
                self.cumulative_in_sync = true;
            }
        }
    }

    pub fn reading(&self, kind: ReadingKind) -> Option<&RangeReading> {
        match kind {
            ReadingKind::Current => self.current.as_ref(),
            ReadingKind::Cumulative => self.cumulative.as_ref(),
        }
    }
}
