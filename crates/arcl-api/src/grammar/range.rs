// ── Range device lines ──
//
// RangeDevice: <name> <NONE|LOCATION_DEPENDENT|LASER> ...
// RangeDeviceCurrentDrawingData: <name> <polyArrows|polyDots> 0xRRGGBB 0xRRGGBB <v1> <v2> <DefaultOn|DefaultOff>
// RangeDeviceCumulativeDrawingData: (same)
// EndOfRangeDeviceList
// RangeDeviceGetCurrent: <name> <count> {<a> <r> <x>}*
// RangeDeviceGetCumulative: (same)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumString;

use super::{Fields, starts_with_ci};
use crate::dispatch::Category;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LocationType {
    #[default]
    None,
    LocationDependent,
    Laser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum DrawType {
    PolyArrows,
    PolyDots,
}

/// How the server suggests a reading series be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawingData {
    pub draw_type: DrawType,
    pub primary_color: u32,
    pub secondary_color: u32,
    pub size: i32,
    pub refresh_ms: i32,
    pub default_on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDeviceInfo {
    pub name: String,
    pub location_type: LocationType,
    /// Numeric suffix of `Laser_<n>` style names.
    pub laser_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeDeviceLine {
    Device(RangeDeviceInfo),
    CurrentDrawing { name: String, data: DrawingData },
    CumulativeDrawing { name: String, data: DrawingData },
    EndOfList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum ReadingKind {
    Current,
    Cumulative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangePoint {
    pub angle: f64,
    pub range: f64,
}

/// One `rangeDeviceGetCurrent` / `rangeDeviceGetCumulative` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    pub name: String,
    pub kind: ReadingKind,
    pub points: Vec<RangePoint>,
    pub received_at: DateTime<Utc>,
}

pub fn laser_index(name: &str) -> Option<u32> {
    name.rsplit_once('_')?.1.parse().ok()
}

pub fn parse_device(line: &str) -> Result<RangeDeviceLine, ParseError> {
    if starts_with_ci(line, "EndOfRangeDeviceList") {
        return Ok(RangeDeviceLine::EndOfList);
    }

    let fields = Fields::new(Category::RangeDevice, line);

    if starts_with_ci(line, "RangeDeviceCurrentDrawingData:") {
        let (name, data) = parse_drawing(&fields)?;
        return Ok(RangeDeviceLine::CurrentDrawing { name, data });
    }
    if starts_with_ci(line, "RangeDeviceCumulativeDrawingData:") {
        let (name, data) = parse_drawing(&fields)?;
        return Ok(RangeDeviceLine::CumulativeDrawing { name, data });
    }
    if starts_with_ci(line, "RangeDevice:") {
        fields.require(3)?;
        let name = fields.get(1)?;
        return Ok(RangeDeviceLine::Device(RangeDeviceInfo {
            name: name.to_owned(),
            location_type: fields.parse(2, "location type")?,
            laser_index: laser_index(name),
        }));
    }

    Err(fields.error("unrecognised range device line"))
}

fn parse_drawing(fields: &Fields<'_>) -> Result<(String, DrawingData), ParseError> {
    fields.require(8)?;
    let color = |idx: usize| -> Result<u32, ParseError> {
        let raw = fields.get(idx)?;
        let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(digits, 16).map_err(|_| fields.error(format!("bad color {raw:?}")))
    };
    let default_on = match fields.get(7)? {
        s if s.eq_ignore_ascii_case("DefaultOn") => true,
        s if s.eq_ignore_ascii_case("DefaultOff") => false,
        other => return Err(fields.error(format!("bad default state {other:?}"))),
    };
    Ok((
        fields.get(1)?.to_owned(),
        DrawingData {
            draw_type: fields.parse(2, "draw type")?,
            primary_color: color(3)?,
            secondary_color: color(4)?,
            size: fields.parse(5, "size")?,
            refresh_ms: fields.parse(6, "refresh")?,
            default_on,
        },
    ))
}

/// Parse a reading line. Only complete `(angle, range, extra)` triples after
/// the count field are kept.
pub fn parse_reading(line: &str, kind: ReadingKind) -> Result<RangeReading, ParseError> {
    let category = match kind {
        ReadingKind::Current => Category::RangeCurrent,
        ReadingKind::Cumulative => Category::RangeCumulative,
    };
    let fields = Fields::new(category, line);
    fields.require(3)?;

    let mut points = Vec::new();
    for triple in fields.tokens()[3..].chunks_exact(3) {
        let num = |raw: &str| {
            raw.parse::<f64>()
                .map_err(|_| fields.error(format!("bad reading value {raw:?}")))
        };
        points.push(RangePoint {
            angle: num(triple[0])?,
            range: num(triple[1])?,
        });
    }

    Ok(RangeReading {
        name: fields.get(1)?.to_owned(),
        kind,
        points,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_device_descriptor() {
        assert_eq!(
            parse_device("RangeDevice: Laser_1 LASER 1").unwrap(),
            RangeDeviceLine::Device(RangeDeviceInfo {
                name: "Laser_1".into(),
                location_type: LocationType::Laser,
                laser_index: Some(1),
            })
        );
        let RangeDeviceLine::Device(d) =
            parse_device("RangeDevice: Sonar LOCATION_DEPENDENT").unwrap()
        else {
            panic!("expected device");
        };
        assert_eq!(d.location_type, LocationType::LocationDependent);
        assert_eq!(d.laser_index, None);
    }

    #[test]
    fn parses_drawing_data() {
        let line = "RangeDeviceCurrentDrawingData: Laser_1 polyDots 0x0000ff 0x000000 80 75 DefaultOn";
        assert_eq!(
            parse_device(line).unwrap(),
            RangeDeviceLine::CurrentDrawing {
                name: "Laser_1".into(),
                data: DrawingData {
                    draw_type: DrawType::PolyDots,
                    primary_color: 0x0000ff,
                    secondary_color: 0,
                    size: 80,
                    refresh_ms: 75,
                    default_on: true,
                },
            }
        );
    }

    #[test]
    fn end_marker() {
        assert_eq!(
            parse_device("EndOfRangeDeviceList").unwrap(),
            RangeDeviceLine::EndOfList
        );
    }

    #[test]
    fn reading_keeps_only_complete_triples() {
        let r = parse_reading(
            "RangeDeviceGetCurrent: Laser_1 3 10 1500 0 20 1600 0 30",
            ReadingKind::Current,
        )
        .unwrap();
        assert_eq!(r.name, "Laser_1");
        assert_eq!(r.points.len(), 2);
        assert_eq!(r.points[1].angle, 20.0);
        assert_eq!(r.points[1].range, 1600.0);
    }

    #[test]
    fn empty_reading_is_valid() {
        let r = parse_reading("RangeDeviceGetCumulative: Laser_1 0", ReadingKind::Cumulative)
            .unwrap();
        assert!(r.points.is_empty());
    }

    #[test]
    fn bad_reading_value_is_a_parse_error() {
        let err = parse_reading("RangeDeviceGetCurrent: Laser_1 1 x 2 3", ReadingKind::Current)
            .unwrap_err();
        assert_eq!(err.category, Category::RangeCurrent);
    }
}
