//! Telemetry Parsing
//!
//! Turns the free-text output of the device interface into typed samples.
//!
//! The raw text is filtered to lines containing one of the configured
//! telemetry keys (case-sensitive), each expected in `Label: value` shape:
//!
//! ```text
//! Battery level: 87%
//! Voltage: 3.8V
//! Total channel utilization: 12.31%
//! ```
//!
//! Labels become metric names (`Battery level` → `Battery_level`). A trailing
//! `%`, `V` or `v` is stripped from numeric values. Values that are not
//! numbers are kept as categorical samples so their presence is still
//! reported without inventing a number.
//!
//! Each metric name appears at most once per device: the first line with a
//! given label wins, and labels that collide with the roster metadata or
//! liveness names are dropped.

use std::collections::HashSet;

use tracing::debug;

use crate::config::PollingConfig;
use crate::roster::DeviceRecord;

/// Metric name of the liveness sample
pub const LIVENESS_METRIC: &str = "up";

/// Names produced from roster fields and liveness, never from telemetry lines
pub const RESERVED_METRICS: [&str; 5] = [
    "contact",
    "location",
    "latitude",
    "longitude",
    LIVENESS_METRIC,
];

/// Unit marker removed from a value before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSuffix {
    Percent,
    Volts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Rendered as a bare number
    Numeric,
    /// Rendered with the value as a `str` label and sample value 1
    Categorical,
    /// Synthetic `up` sample
    Liveness { up: bool },
}

/// One reading for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySample {
    pub metric_name: String,
    pub raw_value: String,
    pub kind: SampleKind,
    pub stripped_unit: Option<UnitSuffix>,
}

impl TelemetrySample {
    /// Builds a sample, classifying `raw_value` as numeric or categorical
    pub fn from_value(metric_name: impl Into<String>, raw_value: impl Into<String>) -> Self {
        let raw_value = raw_value.into();
        let kind = if is_numeric(&raw_value) {
            SampleKind::Numeric
        } else {
            SampleKind::Categorical
        };
        Self {
            metric_name: metric_name.into(),
            raw_value,
            kind,
            stripped_unit: None,
        }
    }

    /// Builds a categorical sample regardless of what the value looks like
    pub fn categorical(metric_name: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            raw_value: raw_value.into(),
            kind: SampleKind::Categorical,
            stripped_unit: None,
        }
    }

    pub fn liveness(up: bool) -> Self {
        Self {
            metric_name: LIVENESS_METRIC.to_string(),
            raw_value: if up { "1" } else { "0" }.to_string(),
            kind: SampleKind::Liveness { up },
            stripped_unit: None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == SampleKind::Numeric
    }
}

/// Matches `[+-]?[0-9]+(\.[0-9]*)?`
pub fn is_numeric(value: &str) -> bool {
    let unsigned = value
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(value);
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    !integer.is_empty()
        && integer.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

/// Turns a free-text label into a metric name fragment
pub fn normalize_metric_name(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strips one trailing unit marker when what remains is a number
///
/// Non-numeric values are returned untouched so words ending in `V` survive.
pub fn strip_unit(value: &str) -> (&str, Option<UnitSuffix>) {
    let value = value.trim();
    let (rest, unit) = if let Some(rest) = value.strip_suffix('%') {
        (rest, UnitSuffix::Percent)
    } else if let Some(rest) = value.strip_suffix(|c: char| c == 'V' || c == 'v') {
        (rest, UnitSuffix::Volts)
    } else {
        return (value, None);
    };

    let rest = rest.trim_end();
    if is_numeric(rest) {
        (rest, Some(unit))
    } else {
        (value, None)
    }
}

/// Samples and liveness for one polled device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTelemetry {
    pub samples: Vec<TelemetrySample>,
    pub matched_lines: usize,
    pub live: bool,
}

/// Converts raw device output into samples
#[derive(Debug, Clone)]
pub struct TelemetryParser {
    keys: Vec<String>,
    liveness_threshold: usize,
}

impl TelemetryParser {
    pub fn new(keys: Vec<String>, liveness_threshold: usize) -> Self {
        let keys = keys.into_iter().filter(|k| !k.trim().is_empty()).collect();
        Self {
            keys,
            liveness_threshold,
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.telemetry_keys.clone(), config.liveness_threshold)
    }

    /// Lines of `raw` that mention a telemetry key
    pub fn matching_lines<'a>(&self, raw: &'a str) -> Vec<&'a str> {
        raw.lines()
            .filter(|line| self.keys.iter().any(|key| line.contains(key.as_str())))
            .collect()
    }

    /// Parses one `Label: value` line; `None` when the line has no usable pair
    pub fn parse_line(&self, line: &str) -> Option<TelemetrySample> {
        let (label, value) = line.split_once(':')?;

        let metric_name = normalize_metric_name(label);
        let (value, unit) = strip_unit(value);
        if metric_name.is_empty() || value.is_empty() {
            return None;
        }

        let mut sample = TelemetrySample::from_value(metric_name, value);
        sample.stripped_unit = unit;
        Some(sample)
    }

    /// Parses telemetry lines only, returning samples and the matched line count
    ///
    /// Every matched line counts toward liveness, including repeats.
    pub fn parse(&self, raw: &str) -> (Vec<TelemetrySample>, usize) {
        let lines = self.matching_lines(raw);
        let mut seen = HashSet::new();
        let mut samples = Vec::new();

        for line in &lines {
            let Some(sample) = self.parse_line(line) else {
                debug!("Ignoring telemetry line without a value: {:?}", line);
                continue;
            };
            if RESERVED_METRICS.contains(&sample.metric_name.as_str()) {
                debug!("Ignoring telemetry line with reserved name: {:?}", line);
                continue;
            }
            if !seen.insert(sample.metric_name.clone()) {
                debug!("Ignoring repeated telemetry line: {:?}", line);
                continue;
            }
            samples.push(sample);
        }

        (samples, lines.len())
    }

    /// Full sample set for a device: telemetry, roster metadata, then liveness
    ///
    /// `response` is `None` when the device interface failed.
    pub fn device_samples(&self, record: &DeviceRecord, response: Option<&str>) -> DeviceTelemetry {
        let (mut samples, matched_lines) = match response {
            Some(raw) => self.parse(raw),
            None => (Vec::new(), 0),
        };
        let live = response.is_some() && matched_lines >= self.liveness_threshold;

        if let Some(contact) = &record.contact {
            samples.push(TelemetrySample::categorical("contact", contact));
        }
        if let Some(location) = &record.location {
            samples.push(TelemetrySample::categorical("location", location));
        }
        if let Some(latitude) = &record.latitude {
            samples.push(TelemetrySample::from_value("latitude", latitude));
        }
        if let Some(longitude) = &record.longitude {
            samples.push(TelemetrySample::from_value("longitude", longitude));
        }
        samples.push(TelemetrySample::liveness(live));

        DeviceTelemetry {
            samples,
            matched_lines,
            live,
        }
    }
}
