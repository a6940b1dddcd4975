//! Command-Line Device Interface
//!
//! Invokes the device tool once per node:
//!
//! ```text
//! <command> [extra_args...] --port <serial device> --request-telemetry --dest !<node>
//! <command> [extra_args...] --host <gateway host> --request-telemetry --dest !<node>
//! ```
//!
//! Standard output is returned as the raw telemetry text. A non-zero exit,
//! a spawn failure or exceeding the timeout is a per-device error. The child
//! is killed if the call is abandoned (timeout or shutdown).

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::DeviceInterface;
use crate::config::{DeviceConfig, Transport};
use crate::error::{ExporterError, Result};
use crate::roster::NodeId;

pub struct CommandInterface {
    program: String,
    mode: Transport,
    port: String,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl CommandInterface {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            program: config.command.clone(),
            mode: config.mode,
            port: config.port.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Overrides the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to the program for `node`
    pub fn arguments(&self, node: &NodeId) -> Vec<String> {
        let transport_flag = match self.mode {
            Transport::Serial => "--port",
            Transport::Ip => "--host",
        };

        let mut args = self.extra_args.clone();
        args.extend([
            transport_flag.to_string(),
            self.port.clone(),
            "--request-telemetry".to_string(),
            "--dest".to_string(),
            node.destination(),
        ]);
        args
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }

        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

impl DeviceInterface for CommandInterface {
    fn preflight(&self) -> Result<()> {
        let resolved = self.resolve_program().ok_or_else(|| {
            ExporterError::InterfaceUnavailable(format!(
                "device command '{}' not found",
                self.program
            ))
        })?;
        debug!("Device command resolved to {}", resolved.display());

        if self.mode == Transport::Serial && !Path::new(&self.port).exists() {
            return Err(ExporterError::InterfaceUnavailable(format!(
                "serial port {} does not exist",
                self.port
            )));
        }

        Ok(())
    }

    async fn request_telemetry(&self, node: &NodeId) -> Result<String> {
        let args = self.arguments(node);
        debug!("Running {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExporterError::DeviceInterface {
                    node: node.to_string(),
                    reason: format!("failed to run {}: {}", self.program, e),
                })
            }
            Err(_) => {
                return Err(ExporterError::DeviceInterface {
                    node: node.to_string(),
                    reason: format!("timed out after {:?}", self.timeout),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output");
            return Err(ExporterError::DeviceInterface {
                node: node.to_string(),
                reason: format!("{} ({})", output.status, detail.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
