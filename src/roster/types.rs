//! Roster Type Definitions
//!
//! - [`NodeId`] - validated mesh node identifier (`!` + 8 hex digits, prefix optional)
//! - [`DeviceRecord`] - one roster entry: node id plus optional display metadata

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::parser::InvalidReason;

/// Number of hex digits in a node id
pub const NODE_ID_DIGITS: usize = 8;

/// Mesh node identifier as written in the roster
///
/// Identity, ordering and hashing use the lowercase hex digits, so `!2F67C123`
/// and `2f67c123` name the same node. Display keeps the roster spelling.
#[derive(Debug, Clone)]
pub struct NodeId {
    raw: String,
    key: String,
}

impl NodeId {
    pub fn parse(field: &str) -> Result<Self, InvalidReason> {
        let raw = field.trim();
        if raw.is_empty() {
            return Err(InvalidReason::MissingNodeId);
        }

        let (offset, digits) = match raw.strip_prefix('!') {
            Some(rest) => (1, rest),
            None => (0, raw),
        };

        let found = digits.chars().count();
        if found != NODE_ID_DIGITS {
            return Err(InvalidReason::WrongLength { found });
        }

        if let Some((index, character)) = digits
            .chars()
            .enumerate()
            .find(|(_, c)| !c.is_ascii_hexdigit())
        {
            return Err(InvalidReason::NonHexDigit {
                character,
                position: index + offset,
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            key: digits.to_ascii_lowercase(),
        })
    }

    /// Node id exactly as the roster spelled it
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lowercase hex digits without prefix
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Roster spelling without the `!` prefix, used in file names
    pub fn bare(&self) -> &str {
        self.raw.strip_prefix('!').unwrap_or(&self.raw)
    }

    /// `!`-prefixed lowercase form the device tool reads as a hex node number
    pub fn destination(&self) -> String {
        format!("!{}", self.key)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// One device to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: NodeId,
    pub contact: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl DeviceRecord {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            contact: None,
            location: None,
            latitude: None,
            longitude: None,
        }
    }

    /// Renders the record back into the five-field roster shape
    pub fn to_csv_line(&self) -> String {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        format!(
            "{},{},{},{},{}",
            self.id,
            field(&self.contact),
            field(&self.location),
            field(&self.latitude),
            field(&self.longitude)
        )
    }
}
