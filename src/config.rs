use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::roster::RosterSource;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the device roster comes from
#[derive(Debug, Deserialize, Clone)]
pub struct DevicesConfig {
    /// Roster path, `-` reads standard input
    #[serde(default = "default_devices_file")]
    pub file: String,
    /// File holding the roster pass-phrase (daemon mode has no prompt)
    #[serde(default)]
    pub passphrase_file: Option<PathBuf>,
}

/// How the mesh gateway is reached
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Serial,
    Ip,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Serial => write!(f, "serial"),
            Transport::Ip => write!(f, "ip"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_transport")]
    pub mode: Transport,
    /// Serial device path or gateway host, depending on `mode`
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_device_timeout")]
    pub timeout_seconds: u64,
    /// Passed to the command before the transport arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_dwell")]
    pub dwell_seconds: u64,
    #[serde(default = "default_telemetry_keys")]
    pub telemetry_keys: Vec<String>,
    #[serde(default = "default_liveness_threshold")]
    pub liveness_threshold: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Unset means exposition lines go to stdout
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub individual_files: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub node_id_format: NodeIdFormat,
}

/// Spelling of the `node` label value
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeIdFormat {
    /// As written in the roster, `!` included
    #[default]
    Default,
    /// Without the leading `!`
    Clean,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    #[serde(default)]
    pub url: Option<String>,
    /// Enables Pushgateway grouping paths (`/metrics/job/<job>/instance/<node>`)
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default = "default_push_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default)]
    pub stats_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_devices_file() -> String {
    "/etc/meshtastic-telemetry/devices.csv".to_string()
}

fn default_command() -> String {
    "meshtastic".to_string()
}

fn default_transport() -> Transport {
    Transport::Serial
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_device_timeout() -> u64 {
    60
}

fn default_dwell() -> u64 {
    10
}

fn default_telemetry_keys() -> Vec<String> {
    vec![
        "Battery".to_string(),
        "Voltage".to_string(),
        "utilization".to_string(),
    ]
}

fn default_liveness_threshold() -> usize {
    3
}

fn default_namespace() -> String {
    "meshtastic".to_string()
}

fn default_push_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    300
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    9464
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            file: default_devices_file(),
            passphrase_file: None,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            mode: default_transport(),
            port: default_port(),
            timeout_seconds: default_device_timeout(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            dwell_seconds: default_dwell(),
            telemetry_keys: default_telemetry_keys(),
            liveness_threshold: default_liveness_threshold(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            individual_files: false,
            namespace: default_namespace(),
            node_id_format: NodeIdFormat::default(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: None,
            job_name: None,
            timeout_seconds: default_push_timeout(),
            headers: HashMap::new(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            stats_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_addr(),
            port: default_server_port(),
        }
    }
}

impl DevicesConfig {
    pub fn source(&self) -> RosterSource {
        RosterSource::from_arg(&self.file)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("MESHMETRICS").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Checks values serde cannot reject on its own
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ExporterError;

        if self.device.command.trim().is_empty() {
            return Err(ExporterError::Config(
                "device.command must not be empty".to_string(),
            ));
        }
        if self.device.timeout_seconds == 0 {
            return Err(ExporterError::Config(
                "device.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.polling.telemetry_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(ExporterError::Config(
                "polling.telemetry_keys must name at least one key".to_string(),
            ));
        }
        if self.output.namespace.is_empty()
            || !self
                .output
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ExporterError::Config(format!(
                "output.namespace '{}' is not a valid metric prefix",
                self.output.namespace
            )));
        }
        if self.push.url.is_some() {
            if self.push.timeout_seconds == 0 {
                return Err(ExporterError::Config(
                    "push.timeout_seconds must be greater than zero".to_string(),
                ));
            }
            // Builds the URL and header map, surfacing any malformed entry
            crate::push::PushPublisher::from_config(&self.push)?;
        }
        if self.daemon.poll_interval_seconds == 0 {
            return Err(ExporterError::Config(
                "daemon.poll_interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
