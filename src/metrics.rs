//! Exporter Self-Metrics
//!
//! Prometheus metrics describing the collector itself, as opposed to the
//! device telemetry it writes out. They are served next to the latest device
//! exposition when the daemon's HTTP server is enabled.
//!
//! # Metrics
//!
//! - `meshtastic_exporter_cycles_total` - Completed poll cycles
//! - `meshtastic_exporter_device_polls_total` - Device polls by result
//!   - Labels: result (live, silent, failed)
//! - `meshtastic_exporter_pushes_total` - HTTP pushes by result
//!   - Labels: result (success, failure)
//! - `meshtastic_exporter_roster_devices` - Devices in the current roster
//! - `meshtastic_exporter_roster_rejected_lines` - Roster lines rejected on last load
//! - `meshtastic_exporter_last_cycle_timestamp_seconds` - End of the last cycle
//! - `meshtastic_exporter_last_cycle_duration_seconds` - Length of the last cycle
//!
//! All metrics use the `meshtastic_exporter_` prefix so they never collide with
//! device series.

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

const NAMESPACE: &str = "meshtastic";
const SUBSYSTEM: &str = "exporter";

/// Outcome of polling one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Responded with enough telemetry
    Live,
    /// Responded, but with too few telemetry lines
    Silent,
    /// Device interface failed
    Failed,
}

impl PollOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            PollOutcome::Live => "live",
            PollOutcome::Silent => "silent",
            PollOutcome::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Arc<Registry>,

    pub cycles_total: Arc<IntCounter>,
    pub device_polls_total: Arc<IntCounterVec>,
    pub pushes_total: Arc<IntCounterVec>,
    pub roster_devices: Arc<IntGauge>,
    pub roster_rejected_lines: Arc<IntGauge>,
    pub last_cycle_timestamp_seconds: Arc<Gauge>,
    pub last_cycle_duration_seconds: Arc<Gauge>,
}

impl ExporterMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounter::with_opts(
            Opts::new("cycles_total", "Completed poll cycles")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
        )?;

        let device_polls_total = IntCounterVec::new(
            Opts::new("device_polls_total", "Device polls by result")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["result"],
        )?;

        let pushes_total = IntCounterVec::new(
            Opts::new("pushes_total", "HTTP pushes by result")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["result"],
        )?;

        let roster_devices = IntGauge::with_opts(
            Opts::new("roster_devices", "Devices in the current roster")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
        )?;

        let roster_rejected_lines = IntGauge::with_opts(
            Opts::new(
                "roster_rejected_lines",
                "Roster lines rejected on the last load",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        )?;

        let last_cycle_timestamp_seconds = Gauge::with_opts(
            Opts::new(
                "last_cycle_timestamp_seconds",
                "Unix time the last poll cycle finished",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        )?;

        let last_cycle_duration_seconds = Gauge::with_opts(
            Opts::new(
                "last_cycle_duration_seconds",
                "Duration of the last poll cycle",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(device_polls_total.clone()))?;
        registry.register(Box::new(pushes_total.clone()))?;
        registry.register(Box::new(roster_devices.clone()))?;
        registry.register(Box::new(roster_rejected_lines.clone()))?;
        registry.register(Box::new(last_cycle_timestamp_seconds.clone()))?;
        registry.register(Box::new(last_cycle_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cycles_total: Arc::new(cycles_total),
            device_polls_total: Arc::new(device_polls_total),
            pushes_total: Arc::new(pushes_total),
            roster_devices: Arc::new(roster_devices),
            roster_rejected_lines: Arc::new(roster_rejected_lines),
            last_cycle_timestamp_seconds: Arc::new(last_cycle_timestamp_seconds),
            last_cycle_duration_seconds: Arc::new(last_cycle_duration_seconds),
        })
    }

    pub fn record_poll(&self, outcome: PollOutcome) {
        self.device_polls_total
            .with_label_values(&[outcome.as_label()])
            .inc();
    }

    pub fn record_push(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.pushes_total.with_label_values(&[result]).inc();
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
