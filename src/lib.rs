//! Meshtastic Telemetry Exporter
//!
//! Polls a roster of Meshtastic mesh repeaters for telemetry and publishes the
//! results in the Prometheus text exposition format.
//!
//! # Overview
//!
//! Devices are reached through a gateway radio by invoking the `meshtastic`
//! command line tool once per node. Telemetry lines such as `Battery level: 87%`
//! are turned into samples, combined with the roster's metadata and a synthetic
//! `up` sample, and written to stdout or to `.prom` files for the node exporter
//! textfile collector. Each device's lines can also be pushed over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   request-telemetry   ┌─────────┐   LoRa   ┌──────────┐
//! │  Roster  │──►│ Scheduler │ ────────────────────► │ Gateway │ ◄──────► │ Repeater │
//! │  (CSV)   │   │           │ ◄──────────────────── │  radio  │          │  nodes   │
//! └──────────┘   └─────┬─────┘       stdout text     └─────────┘          └──────────┘
//!                      │
//!        ┌─────────────┼──────────────┐
//!        ▼             ▼              ▼
//!   stdout /      .prom files    HTTP push
//! ```
//!
//! # Modules
//!
//! - [`roster`] - Roster parsing, validation and optional decryption
//! - [`device`] - Device interface abstraction and the command implementation
//! - [`scheduler`] - Sequential polling with dwell time and interrupt handling
//! - [`telemetry`] - Extraction of samples from raw device output
//! - [`exposition`] - Prometheus text formatting
//! - [`output`] - Stdout and atomic file output
//! - [`push`] - Optional HTTP push
//! - [`daemon`] - Periodic collection with stats file and HTTP server
//! - [`server`] - HTTP endpoints for daemon mode
//! - [`metrics`] - Exporter self-metrics
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_metrics::{config::Config, roster};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     let roster = roster::load(&config.devices.source(), None)?;
//!     println!("{} devices", roster.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod daemon;
pub mod device;
pub mod error;
pub mod exposition;
pub mod metrics;
pub mod output;
pub mod progress;
pub mod push;
pub mod roster;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod telemetry;

/// Reported in the `version` label of every `up` sample
pub const COLLECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");
