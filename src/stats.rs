//! Daemon statistics file
//!
//! A small JSON document rewritten after every cycle so operators can see how
//! the daemon is doing without scraping it.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::output::atomic_write;
use crate::scheduler::RunResult;

#[derive(Debug, Clone, Serialize)]
pub struct DaemonStats {
    pub start_time: DateTime<Utc>,
    pub last_poll: Option<DateTime<Utc>>,
    pub total_polls: u64,
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub nodes_processed: u64,
    pub nodes_successful: u64,
    pub push_successful: u64,
    pub push_failed: u64,
}

impl DaemonStats {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            last_poll: None,
            total_polls: 0,
            successful_polls: 0,
            failed_polls: 0,
            nodes_processed: 0,
            nodes_successful: 0,
            push_successful: 0,
            push_failed: 0,
        }
    }

    /// Folds a finished cycle into the totals
    ///
    /// A cycle counts as successful when at least one device was live.
    pub fn record_cycle(&mut self, result: &RunResult, at: DateTime<Utc>) {
        self.last_poll = Some(at);
        self.total_polls += 1;
        if result.live_devices() > 0 {
            self.successful_polls += 1;
        } else {
            self.failed_polls += 1;
        }
        self.nodes_processed += result.devices_polled() as u64;
        self.nodes_successful += result.live_devices() as u64;
        self.push_successful += result.push_successes as u64;
        self.push_failed += result.push_failures as u64;
    }

    /// Counts a cycle that aborted before producing a result
    pub fn record_failed_cycle(&mut self, at: DateTime<Utc>) {
        self.last_poll = Some(at);
        self.total_polls += 1;
        self.failed_polls += 1;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Atomically replaces the stats file at `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut json = self.to_json()?;
        json.push('\n');
        atomic_write(path, json.as_bytes())
    }
}
