//! Device Interface
//!
//! The radio transport is an external collaborator: given a node id it returns
//! raw diagnostic text, or fails. [`DeviceInterface`] is the seam the
//! scheduler polls through; [`CommandInterface`] drives the `meshtastic`
//! command-line tool (or anything with the same calling convention).

pub mod command;

pub use command::CommandInterface;

use std::future::Future;

use crate::error::Result;
use crate::roster::NodeId;

/// Source of raw telemetry text for one node at a time
///
/// Implementations share a single radio channel, so the scheduler never
/// calls `request_telemetry` concurrently.
pub trait DeviceInterface {
    /// Verifies the interface is usable before any device is polled
    ///
    /// Failures here are fatal for the run.
    fn preflight(&self) -> Result<()>;

    /// Requests telemetry from `node`, returning the interface's raw output
    fn request_telemetry(&self, node: &NodeId) -> impl Future<Output = Result<String>> + Send;
}
