// ── Config section lines ──
//
// GetConfigSectionList: <section>
// EndOfGetConfigSectionList
// GetConfigSectionValue: <name> [<value...>]
// EndOfGetConfigSectionValues
// CommandError: getconfigsectionvalues <section>
// Configuration changed

use serde::{Deserialize, Serialize};

use super::starts_with_ci;
use crate::dispatch::Category;
use crate::error::ParseError;

pub const BEGIN_LIST: &str = "_beginList";
pub const END_LIST: &str = "_endList";

const SECTION_LIST_PREFIX: &str = "GetConfigSectionList:";
const SECTION_VALUE_PREFIX: &str = "GetConfigSectionValue:";
const COMMAND_ERROR_PREFIX: &str = "CommandError:";

/// One entry of a config section. Order inside a section matters: list
/// blocks are delimited by `_beginList` / `_endList` pseudo-entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
    pub begin_list: bool,
    pub end_list: bool,
}

impl ConfigEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let begin_list = name == BEGIN_LIST || value == BEGIN_LIST;
        let end_list = name == END_LIST || value == END_LIST;
        Self {
            name,
            value,
            begin_list,
            end_list,
        }
    }

    pub fn is_marker(&self) -> bool {
        self.begin_list || self.end_list
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLine {
    SectionName(String),
    EndOfSectionList,
    Entry(ConfigEntry),
    EndOfSectionValues,
    /// The server could not serve `getconfigsectionvalues` for this section.
    CommandError { section: String },
    /// A `Configuration changed` notice.
    Changed,
}

fn after_prefix<'a>(line: &'a str, prefix: &str) -> &'a str {
    line.get(prefix.len()..).unwrap_or_default().trim()
}

/// Split `<name> [<value...>]` into an entry.
pub fn parse_entry(text: &str) -> Option<ConfigEntry> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(match text.split_once(char::is_whitespace) {
        Some((name, value)) => ConfigEntry::new(name, value.trim()),
        None => ConfigEntry::new(text, ""),
    })
}

pub fn parse(line: &str) -> Result<ConfigLine, ParseError> {
    if starts_with_ci(line, "Configuration changed") {
        return Ok(ConfigLine::Changed);
    }
    if starts_with_ci(line, "EndOfGetConfigSectionList") {
        return Ok(ConfigLine::EndOfSectionList);
    }
    if starts_with_ci(line, "EndOfGetConfigSection") {
        return Ok(ConfigLine::EndOfSectionValues);
    }

    if starts_with_ci(line, COMMAND_ERROR_PREFIX) {
        let rest = after_prefix(line, COMMAND_ERROR_PREFIX);
        let section = rest
            .split_once(char::is_whitespace)
            .map(|(_, section)| section.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::new(Category::Config, line, "command error names no section"))?;
        return Ok(ConfigLine::CommandError {
            section: section.to_owned(),
        });
    }

    if starts_with_ci(line, SECTION_LIST_PREFIX) {
        let name = after_prefix(line, SECTION_LIST_PREFIX);
        if name.is_empty() {
            return Err(ParseError::new(Category::Config, line, "empty section name"));
        }
        return Ok(ConfigLine::SectionName(name.to_owned()));
    }

    if starts_with_ci(line, SECTION_VALUE_PREFIX) {
        return parse_entry(after_prefix(line, SECTION_VALUE_PREFIX))
            .map(ConfigLine::Entry)
            .ok_or_else(|| ParseError::new(Category::Config, line, "empty config entry"));
    }

    Err(ParseError::new(Category::Config, line, "unrecognised config line"))
}
