//! Poll Scheduling
//!
//! Drives one collection cycle over the roster.
//!
//! # Behaviour
//!
//! - Devices are polled strictly one at a time, in roster order, because they
//!   all share one radio channel.
//! - After each device (except the last) the scheduler idles for the dwell
//!   time so polling itself does not flood the mesh.
//! - A failing device is reported with `up` 0 and the cycle moves on.
//! - A shutdown request stops the cycle between steps; it never interrupts a
//!   file being committed.
//!
//! All per-cycle state lives in the returned [`RunResult`].

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device::DeviceInterface;
use crate::error::Result;
use crate::exposition::{to_body, MetricFormatter};
use crate::metrics::{ExporterMetrics, PollOutcome};
use crate::output::OutputSink;
use crate::progress::ProgressTask;
use crate::push::PushPublisher;
use crate::roster::{DeviceRecord, Roster};
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{TelemetryParser, TelemetrySample};

/// What a run does with the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Poll every device and write metrics
    Collect,
    /// Print node ids only
    ListIds,
    /// Print full roster lines
    ListFull,
}

impl RunMode {
    /// Maps the number of `-l` flags to a mode
    pub fn from_list_count(count: u8) -> Self {
        match count {
            0 => RunMode::Collect,
            1 => RunMode::ListIds,
            _ => RunMode::ListFull,
        }
    }
}

/// Prints the roster for the list modes; `Collect` prints nothing
pub fn list_roster<W: Write>(roster: &Roster, mode: RunMode, out: &mut W) -> io::Result<()> {
    for record in &roster.devices {
        match mode {
            RunMode::ListIds => writeln!(out, "{}", record.id)?,
            RunMode::ListFull => writeln!(out, "{}", record.to_csv_line())?,
            RunMode::Collect => {}
        }
    }
    out.flush()
}

/// Shared, read-only collaborators for a cycle
///
/// Public fields for ergonomic construction; everything is borrowed.
pub struct PollContext<'a, D> {
    pub device: &'a D,
    pub parser: &'a TelemetryParser,
    pub formatter: &'a MetricFormatter,
    pub publisher: Option<&'a PushPublisher>,
    pub metrics: &'a ExporterMetrics,
    pub dwell: Duration,
}

/// Result of polling one device
#[derive(Debug, Clone)]
pub struct DevicePoll {
    pub record: DeviceRecord,
    pub outcome: PollOutcome,
    pub samples: Vec<TelemetrySample>,
    pub lines: Vec<String>,
    pub error: Option<String>,
}

impl DevicePoll {
    pub fn is_live(&self) -> bool {
        self.outcome == PollOutcome::Live
    }
}

/// Every device polled in one cycle, in polling order
#[derive(Debug, Clone, Default)]
pub struct CollectionRun {
    pub polls: Vec<DevicePoll>,
}

/// Accumulated outcome of a cycle
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub run: CollectionRun,
    /// Rejected roster lines
    pub record_errors: usize,
    /// Devices whose interface call failed
    pub device_errors: usize,
    pub push_successes: usize,
    pub push_failures: usize,
    pub interrupted: bool,
    /// Files made visible by this cycle
    pub written: Vec<PathBuf>,
}

impl RunResult {
    pub fn new(record_errors: usize) -> Self {
        Self {
            record_errors,
            ..Self::default()
        }
    }

    fn record(&mut self, poll: DevicePoll) {
        if poll.outcome == PollOutcome::Failed {
            self.device_errors += 1;
        }
        self.run.polls.push(poll);
    }

    /// True when any roster line or device failed
    pub fn has_errors(&self) -> bool {
        self.record_errors > 0 || self.device_errors > 0
    }

    pub fn devices_polled(&self) -> usize {
        self.run.polls.len()
    }

    pub fn live_devices(&self) -> usize {
        self.run.polls.iter().filter(|p| p.is_live()).count()
    }

    /// All exposition lines of the cycle as one body
    pub fn exposition(&self) -> String {
        let lines: Vec<String> = self
            .run
            .polls
            .iter()
            .flat_map(|poll| poll.lines.iter().cloned())
            .collect();
        to_body(&lines)
    }

    /// Process exit code for a one-shot run
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            130
        } else if self.has_errors() {
            1
        } else {
            0
        }
    }
}

/// Polls every device in `roster` and writes the results to `sink`
///
/// Per-device failures are folded into the result. Only output errors are
/// returned as `Err`; in that case nothing uncommitted becomes visible.
pub async fn run_collection<D: DeviceInterface>(
    ctx: &PollContext<'_, D>,
    roster: &Roster,
    mut sink: OutputSink,
    shutdown: &mut ShutdownSignal,
    progress: &ProgressTask,
) -> Result<RunResult> {
    let mut result = RunResult::new(roster.rejected.len());
    let total = roster.len();
    info!("Starting poll of {} devices", total);

    for (index, record) in roster.devices.iter().enumerate() {
        if shutdown.is_triggered() {
            result.interrupted = true;
            break;
        }

        progress.set_message(format!("Polling {} ({}/{})", record.id, index + 1, total));
        debug!(
            "Processing node {} (contact: {}, location: {}, latitude: {}, longitude: {})",
            record.id,
            record.contact.as_deref().unwrap_or("-"),
            record.location.as_deref().unwrap_or("-"),
            record.latitude.as_deref().unwrap_or("-"),
            record.longitude.as_deref().unwrap_or("-"),
        );

        let response = tokio::select! {
            response = ctx.device.request_telemetry(&record.id) => Some(response),
            _ = shutdown.wait() => None,
        };
        let Some(response) = response else {
            result.interrupted = true;
            break;
        };

        let poll = process_response(ctx, record, response);
        sink.write_device(&record.id, &poll.lines)?;

        if let Some(publisher) = ctx.publisher {
            match publisher.publish(&record.id, &to_body(&poll.lines)).await {
                Ok(()) => {
                    result.push_successes += 1;
                    ctx.metrics.record_push(true);
                }
                Err(e) => {
                    warn!("Push for {} failed: {}", record.id, e);
                    result.push_failures += 1;
                    ctx.metrics.record_push(false);
                }
            }
        }

        ctx.metrics.record_poll(poll.outcome);
        result.record(poll);

        if index + 1 < total && !ctx.dwell.is_zero() {
            debug!("Dwelling {:?} before next device", ctx.dwell);
            let dwelled = tokio::select! {
                _ = tokio::time::sleep(ctx.dwell) => true,
                _ = shutdown.wait() => false,
            };
            if !dwelled {
                result.interrupted = true;
                break;
            }
        }
    }

    if result.interrupted {
        warn!(
            "Poll interrupted after {}/{} devices",
            result.devices_polled(),
            total
        );
        result.written = sink.abandon();
    } else {
        result.written = sink.finish()?;
    }

    info!(
        "Poll completed: {}/{} devices live",
        result.live_devices(),
        result.devices_polled()
    );
    Ok(result)
}

fn process_response<D>(
    ctx: &PollContext<'_, D>,
    record: &DeviceRecord,
    response: Result<String>,
) -> DevicePoll {
    let (raw, error) = match response {
        Ok(raw) => (Some(raw), None),
        Err(e) => {
            warn!("{}", e);
            (None, Some(e.to_string()))
        }
    };
    if let Some(raw) = &raw {
        debug!("Raw response from {}: {:?}", record.id, raw);
    }

    let telemetry = ctx.parser.device_samples(record, raw.as_deref());
    let outcome = if error.is_some() {
        PollOutcome::Failed
    } else if telemetry.live {
        PollOutcome::Live
    } else {
        warn!(
            "No usable telemetry from {} ({} matching lines)",
            record.id, telemetry.matched_lines
        );
        PollOutcome::Silent
    };

    let lines = ctx.formatter.format_device(&record.id, &telemetry.samples);
    for line in &lines {
        debug!("{}", line);
    }

    DevicePoll {
        record: record.clone(),
        outcome,
        samples: telemetry.samples,
        lines,
        error,
    }
}
