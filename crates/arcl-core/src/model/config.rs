// ── Config sections ──
//
// Text form, one section per header:
//
//   Section::<name>
//   <entryName>[ <entryValue>]
//   ...
//
// Blank lines are ignored. Several sections may be concatenated.

use arcl_api::ConfigEntry;
use arcl_api::grammar::config::parse_entry;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const SECTION_HEADER: &str = "Section::";

/// A named config section. Entry order is significant: list blocks are
/// delimited by `_beginList` / `_endList` entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigSection {
    pub name: String,
    pub entries: Vec<ConfigEntry>,
}

impl ConfigSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entries(name: impl Into<String>, entries: Vec<ConfigEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("{SECTION_HEADER}{}\n", self.name);
        for entry in &self.entries {
            text.push_str(&entry.name);
            if !entry.value.is_empty() {
                text.push(' ');
                text.push_str(&entry.value);
            }
            text.push('\n');
        }
        text
    }

    /// Parse exactly one section.
    pub fn from_text(text: &str) -> Result<Self, CoreError> {
        let mut sections = parse_sections(text)?;
        match sections.len() {
            1 => Ok(sections.remove(0)),
            0 => Err(CoreError::Config {
                message: "no section header found".into(),
            }),
            n => Err(CoreError::Config {
                message: format!("expected one section, found {n}"),
            }),
        }
    }

    /// `(entry, value_first)` pairs in write order. Entries strictly
    /// inside a list block go value first; markers and top-level entries
    /// go name first.
    pub fn write_order(&self) -> impl Iterator<Item = (&ConfigEntry, bool)> {
        let mut depth = 0usize;
        self.entries.iter().map(move |entry| {
            if entry.begin_list {
                depth += 1;
                (entry, false)
            } else if entry.end_list {
                depth = depth.saturating_sub(1);
                (entry, false)
            } else {
                (entry, depth > 0)
            }
        })
    }
}

/// Parse a block of concatenated sections.
pub fn parse_sections(text: &str) -> Result<Vec<ConfigSection>, CoreError> {
    let mut sections: Vec<ConfigSection> = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix(SECTION_HEADER) {
            sections.push(ConfigSection::new(name.trim()));
            continue;
        }

        let Some(section) = sections.last_mut() else {
            return Err(CoreError::Config {
                message: format!("line {}: entry before any section header", number + 1),
            });
        };
        if let Some(entry) = parse_entry(line) {
            section.entries.push(entry);
        }
    }

    Ok(sections)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn general() -> ConfigSection {
        ConfigSection::with_entries(
            "General",
            vec![
                ConfigEntry::new("Radius", "40"),
                ConfigEntry::new("_beginList", "Model"),
                ConfigEntry::new("LD-90", ""),
                ConfigEntry::new("_endList", "Model"),
            ],
        )
    }

    #[test]
    fn round_trip_keeps_order_and_list_markers() {
        let section = general();
        let text = section.to_text();
        assert_eq!(
            text,
            "Section::General\nRadius 40\n_beginList Model\nLD-90\n_endList Model\n"
        );

        let parsed = ConfigSection::from_text(&text).unwrap();
        assert_eq!(parsed, section);

        let flags: Vec<(bool, bool)> = parsed.entries.iter().map(|e| (e.begin_list, e.end_list)).collect();
        assert_eq!(flags, vec![(false, false), (true, false), (false, false), (false, true)]);
    }

    #[test]
    fn concatenated_sections_and_blank_lines() {
        let text = "Section::A\nx 1\n\nSection::B\ny two words\n";
        let sections = parse_sections(text).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].entries[0], ConfigEntry::new("y", "two words"));
        assert!(ConfigSection::from_text(text).is_err());
    }

    #[test]
    fn entry_without_header_is_rejected() {
        assert!(matches!(
            parse_sections("Radius 40\n"),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn write_order_flips_only_inside_lists() {
        let order: Vec<bool> = general().write_order().map(|(_, value_first)| value_first).collect();
        assert_eq!(order, vec![false, false, true, false]);
    }
}
