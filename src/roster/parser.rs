//! Roster Line Grammar
//!
//! ```text
//! line     := blank | comment | record
//! comment  := ws* '#' any*
//! record   := node_id (',' field){0,4} (',' any*)*
//! node_id  := ws* '!'? hex{8} ws*
//! field    := ws* text ws*          (empty text means "absent")
//! ```
//!
//! Each line parses into a [`LineOutcome`]. Rejected lines carry an
//! [`InvalidReason`] so callers can report exactly why a line was skipped.

use std::fmt;

use super::types::{DeviceRecord, NodeId, NODE_ID_DIGITS};

/// Result of parsing a single roster line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Blank,
    Comment,
    Record(DeviceRecord),
    Invalid(InvalidReason),
}

/// Why a roster line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    MissingNodeId,
    WrongLength { found: usize },
    NonHexDigit { character: char, position: usize },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::MissingNodeId => write!(f, "node id is missing"),
            InvalidReason::WrongLength { found } => write!(
                f,
                "node id must have {} hex digits, found {}",
                NODE_ID_DIGITS, found
            ),
            InvalidReason::NonHexDigit {
                character,
                position,
            } => write!(
                f,
                "node id has non-hex character '{}' at position {}",
                character, position
            ),
        }
    }
}

/// A rejected line with its location in the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLine {
    pub line_number: usize,
    pub content: String,
    pub reason: InvalidReason,
}

impl fmt::Display for InvalidLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} ({})",
            self.line_number, self.reason, self.content
        )
    }
}

pub fn parse_line(line: &str) -> LineOutcome {
    let line = line.trim_start_matches('\u{feff}').trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }
    if line.starts_with('#') {
        return LineOutcome::Comment;
    }

    let mut fields = line.split(',');
    let id = match NodeId::parse(fields.next().unwrap_or_default()) {
        Ok(id) => id,
        Err(reason) => return LineOutcome::Invalid(reason),
    };

    let mut optional = || {
        fields
            .next()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut record = DeviceRecord::new(id);
    record.contact = optional();
    record.location = optional();
    record.latitude = optional();
    record.longitude = optional();

    LineOutcome::Record(record)
}
