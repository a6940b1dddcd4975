//! Exposition Formatting
//!
//! Renders samples as Prometheus text exposition lines, one per sample:
//!
//! ```text
//! meshtastic_Battery_level{node="!2f67c123"} 87
//! meshtastic_contact{node="!2f67c123",str="Jon"} 1
//! meshtastic_up{node="!2f67c123",version="0.5.0"} 1
//! ```
//!
//! The `node` label is always present. Categorical values travel in the `str`
//! label with sample value 1. The liveness sample carries the collector
//! version as a label and 1/0 as its value. With
//! [`NodeIdFormat::Clean`] the `node` label drops the leading `!`.

use crate::config::{NodeIdFormat, OutputConfig};
use crate::roster::NodeId;
use crate::telemetry::{SampleKind, TelemetrySample};
use crate::COLLECTOR_VERSION;

#[derive(Debug, Clone)]
pub struct MetricFormatter {
    namespace: String,
    version: String,
    node_id_format: NodeIdFormat,
}

impl MetricFormatter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: COLLECTOR_VERSION.to_string(),
            node_id_format: NodeIdFormat::Default,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.namespace.clone()).with_node_id_format(config.node_id_format)
    }

    pub fn with_node_id_format(mut self, format: NodeIdFormat) -> Self {
        self.node_id_format = format;
        self
    }

    /// Overrides the version label on liveness samples
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.namespace, name)
    }

    /// Value of the `node` label for `node`
    pub fn node_label<'a>(&self, node: &'a NodeId) -> &'a str {
        match self.node_id_format {
            NodeIdFormat::Default => node.as_str(),
            NodeIdFormat::Clean => node.bare(),
        }
    }

    pub fn format_sample(&self, node: &NodeId, sample: &TelemetrySample) -> String {
        let name = self.metric_name(&sample.metric_name);
        let node = escape_label_value(self.node_label(node));

        match sample.kind {
            SampleKind::Numeric => format!("{}{{node=\"{}\"}} {}", name, node, sample.raw_value),
            SampleKind::Categorical => format!(
                "{}{{node=\"{}\",str=\"{}\"}} 1",
                name,
                node,
                escape_label_value(&sample.raw_value)
            ),
            SampleKind::Liveness { up } => format!(
                "{}{{node=\"{}\",version=\"{}\"}} {}",
                name,
                node,
                escape_label_value(&self.version),
                u8::from(up)
            ),
        }
    }

    pub fn format_device(&self, node: &NodeId, samples: &[TelemetrySample]) -> Vec<String> {
        samples
            .iter()
            .map(|sample| self.format_sample(node, sample))
            .collect()
    }
}

impl Default for MetricFormatter {
    fn default() -> Self {
        Self::new("meshtastic")
    }
}

/// Escapes `\`, `"` and newlines as the text format requires
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Joins lines into a newline-terminated exposition body
pub fn to_body(lines: &[String]) -> String {
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    body
}
