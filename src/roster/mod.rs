//! Device Roster
//!
//! Loads the list of devices to poll from a CSV file or standard input,
//! optionally decrypting it first.
//!
//! # Format
//!
//! ```text
//! # NodeID,Contact,Location,Latitude,Longitude
//! !2f67c123,Jon,Derp Hill,21.1234,-122.56789
//! !56a58b6a,,,,
//! ```
//!
//! Only the node id is required. Lines with a malformed node id are reported
//! and skipped; the rest of the roster still loads. The resulting device list
//! is de-duplicated by node id and sorted ascending so every run polls in the
//! same order.

pub mod decrypt;
pub mod parser;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::error::{ExporterError, Result};
pub use decrypt::DecryptedReader;
pub use parser::{parse_line, InvalidLine, InvalidReason, LineOutcome};
pub use types::{DeviceRecord, NodeId};

/// Where roster bytes are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterSource {
    Stdin,
    File(PathBuf),
}

impl RosterSource {
    /// `-` selects standard input, anything else is a path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            RosterSource::Stdin
        } else {
            RosterSource::File(PathBuf::from(arg))
        }
    }
}

impl fmt::Display for RosterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterSource::Stdin => write!(f, "<stdin>"),
            RosterSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Validated, de-duplicated, ordered device list
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub devices: Vec<DeviceRecord>,
    pub rejected: Vec<InvalidLine>,
    pub duplicates: usize,
}

impl Roster {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut by_key: BTreeMap<String, DeviceRecord> = BTreeMap::new();
        let mut rejected = Vec::new();
        let mut duplicates = 0;

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => {
                    ExporterError::Roster("roster is not valid UTF-8 text".to_string())
                }
                _ => ExporterError::Io(e),
            })?;
            let line_number = index + 1;

            match parse_line(&line) {
                LineOutcome::Blank | LineOutcome::Comment => {}
                LineOutcome::Record(record) => {
                    debug!("Roster line {}: {}", line_number, record.to_csv_line());
                    let key = record.id.key().to_string();
                    if by_key.contains_key(&key) {
                        duplicates += 1;
                        debug!(
                            "Roster line {}: duplicate node {} ignored",
                            line_number, record.id
                        );
                    } else {
                        by_key.insert(key, record);
                    }
                }
                LineOutcome::Invalid(reason) => rejected.push(InvalidLine {
                    line_number,
                    content: line.trim().to_string(),
                    reason,
                }),
            }
        }

        Ok(Self {
            devices: by_key.into_values().collect(),
            rejected,
            duplicates,
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// True when any line was rejected
    pub fn has_errors(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Opens the roster source, decrypting when a pass-phrase is given
pub fn open(source: &RosterSource, passphrase: Option<&SecretString>) -> Result<Box<dyn BufRead>> {
    let raw: Box<dyn Read> = match source {
        RosterSource::Stdin => Box::new(io::stdin()),
        RosterSource::File(path) => Box::new(File::open(path).map_err(|e| {
            ExporterError::Roster(format!("cannot open {}: {}", path.display(), e))
        })?),
    };

    match passphrase {
        Some(secret) => Ok(Box::new(BufReader::new(DecryptedReader::new(raw, secret)?))),
        None => Ok(Box::new(BufReader::new(raw))),
    }
}

/// Loads and validates the roster, logging every rejected line
///
/// Rejected lines do not fail the load; check [`Roster::has_errors`].
/// A roster without a single valid device is an error.
pub fn load(source: &RosterSource, passphrase: Option<&SecretString>) -> Result<Roster> {
    let roster = Roster::from_reader(open(source, passphrase)?)?;

    for invalid in &roster.rejected {
        warn!("Skipping roster {}", invalid);
    }
    if roster.duplicates > 0 {
        warn!(
            "Ignored {} duplicate roster entries in {}",
            roster.duplicates, source
        );
    }
    if roster.is_empty() {
        return Err(ExporterError::EmptyRoster);
    }

    info!("Loaded {} devices from {}", roster.len(), source);
    Ok(roster)
}
