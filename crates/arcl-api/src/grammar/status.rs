// ── One-line status ──
//
// Status: <text...> DockingState: <s> ForcedState: <s> ChargeState: <s>
//         StateOfCharge: <f> Location: <x> <y> <th> Temperature: <f> ...
//
// Keys may be missing or reordered, and unknown keys are skipped. A key's
// value runs up to the next token ending in `:`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Fields;
use crate::dispatch::Category;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Latest `onelinestatus` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: String,
    pub docking_state: Option<String>,
    pub forced_state: Option<String>,
    pub charge_state: Option<String>,
    pub state_of_charge: Option<f64>,
    pub pose: Option<Pose>,
    pub temperature: Option<f64>,
    pub received_at: DateTime<Utc>,
}

fn is_key(token: &str) -> bool {
    token.ends_with(':')
}

pub fn parse(line: &str) -> Result<StatusSnapshot, ParseError> {
    let fields = Fields::new(Category::Status, line);
    let tokens = fields.tokens();

    match tokens.first() {
        Some(first) if first.eq_ignore_ascii_case("Status:") => {}
        _ => return Err(fields.error("line does not start with Status:")),
    }

    let mut snapshot = StatusSnapshot {
        status: String::new(),
        docking_state: None,
        forced_state: None,
        charge_state: None,
        state_of_charge: None,
        pose: None,
        temperature: None,
        received_at: Utc::now(),
    };

    let mut i = 0;
    while i < tokens.len() {
        let key = tokens[i];
        i += 1;
        let start = i;
        while i < tokens.len() && !is_key(tokens[i]) {
            i += 1;
        }
        let values = &tokens[start..i];
        let joined = || (!values.is_empty()).then(|| values.join(" "));

        match key.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "status" => snapshot.status = values.join(" "),
            "dockingstate" => snapshot.docking_state = joined(),
            "forcedstate" => snapshot.forced_state = joined(),
            "chargestate" => snapshot.charge_state = joined(),
            "stateofcharge" => {
                snapshot.state_of_charge = values.first().and_then(|v| v.parse().ok());
            }
            "temperature" => snapshot.temperature = values.first().and_then(|v| v.parse().ok()),
            "location" => snapshot.pose = Some(parse_pose(&fields, values)?),
            _ => {}
        }
    }

    Ok(snapshot)
}

fn parse_pose(fields: &Fields<'_>, values: &[&str]) -> Result<Pose, ParseError> {
    let [x, y, heading] = values else {
        return Err(fields.error(format!(
            "Location needs 3 values, got {}",
            values.len()
        )));
    };
    let num = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|_| fields.error(format!("bad Location value {raw:?}")))
    };
    Ok(Pose {
        x: num(x)?,
        y: num(y)?,
        heading: num(heading)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    const LINE: &str = "Status: Stopped DockingState: Undocked ForcedState: Unforced \
                        ChargeState: Not StateOfCharge: 84.5 Location: 1200 -340 90 \
                        LocalizationScore: 0.98 Temperature: 31";

    #[test]
    fn parses_full_status_line() {
        let s = parse(LINE).unwrap();
        assert_eq!(s.status, "Stopped");
        assert_eq!(s.docking_state.as_deref(), Some("Undocked"));
        assert_eq!(s.forced_state.as_deref(), Some("Unforced"));
        assert_eq!(s.charge_state.as_deref(), Some("Not"));
        assert_eq!(s.state_of_charge, Some(84.5));
        assert_eq!(
            s.pose,
            Some(Pose {
                x: 1200.0,
                y: -340.0,
                heading: 90.0
            })
        );
        assert_eq!(s.temperature, Some(31.0));
    }

    #[test]
    fn multi_word_status_text_is_joined() {
        let s = parse("Status: Going to goal A StateOfCharge: 50").unwrap();
        assert_eq!(s.status, "Going to goal A");
        assert_eq!(s.state_of_charge, Some(50.0));
        assert_eq!(s.pose, None);
    }

    #[test]
    fn bad_numeric_value_becomes_none() {
        let s = parse("Status: Idle StateOfCharge: n/a Temperature: hot").unwrap();
        assert_eq!(s.state_of_charge, None);
        assert_eq!(s.temperature, None);
    }

    #[test]
    fn bad_location_is_a_parse_error() {
        let err = parse("Status: Idle Location: 1 2").unwrap_err();
        assert_eq!(err.category, Category::Status);
        assert!(parse("Status: Idle Location: 1 x 3").is_err());
    }

    #[test]
    fn requires_status_prefix() {
        assert!(parse("DockingState: Docked").is_err());
    }
}
