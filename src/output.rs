//! Exposition Output
//!
//! Writes formatted lines either to stdout or into a directory watched by a
//! scraper (typically the node_exporter textfile collector).
//!
//! # Atomicity
//!
//! Directory output is staged in a temporary file next to the destination and
//! renamed into place once the unit of work is complete:
//!
//! - aggregate mode: one `<namespace>.prom` for the whole run, committed at the end
//! - per-device mode: one `<namespace>-<node>.prom` per device, committed after that device
//!
//! The rename is the only point at which new content becomes visible, so a
//! reader sees either the previous complete file or the new complete file.
//! Temporary files that are never committed are removed on drop.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::OutputConfig;
use crate::error::{ExporterError, Result};
use crate::roster::NodeId;

/// How directory output is split into files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Aggregate,
    PerDevice,
}

enum Target {
    Writer(Box<dyn Write + Send>),
    Directory {
        dir: PathBuf,
        mode: OutputMode,
        pending: Option<NamedTempFile>,
    },
}

pub struct OutputSink {
    target: Target,
    namespace: String,
    committed: Vec<PathBuf>,
}

impl OutputSink {
    /// Builds the sink described by the output configuration
    pub fn from_config(config: &OutputConfig) -> Result<Self> {
        match &config.directory {
            Some(dir) => {
                let mode = if config.individual_files {
                    OutputMode::PerDevice
                } else {
                    OutputMode::Aggregate
                };
                Self::directory(dir, mode, &config.namespace)
            }
            None => Ok(Self::writer(Box::new(io::stdout()), &config.namespace)),
        }
    }

    /// Sink writing lines straight to `writer`
    pub fn writer(writer: Box<dyn Write + Send>, namespace: &str) -> Self {
        Self {
            target: Target::Writer(writer),
            namespace: namespace.to_string(),
            committed: Vec::new(),
        }
    }

    /// Sink writing atomically into `dir`, creating it if needed
    pub fn directory(dir: &Path, mode: OutputMode, namespace: &str) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            ExporterError::Output(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            target: Target::Directory {
                dir: dir.to_path_buf(),
                mode,
                pending: None,
            },
            namespace: namespace.to_string(),
            committed: Vec::new(),
        })
    }

    pub fn aggregate_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.prom", self.namespace))
    }

    pub fn device_path(&self, dir: &Path, node: &NodeId) -> PathBuf {
        dir.join(format!("{}-{}.prom", self.namespace, node.bare()))
    }

    /// Writes one device's lines
    ///
    /// In per-device mode the device file is committed before returning.
    pub fn write_device(&mut self, node: &NodeId, lines: &[String]) -> Result<()> {
        let device_path = match &self.target {
            Target::Directory { dir, .. } => Some(self.device_path(dir, node)),
            Target::Writer(_) => None,
        };
        let aggregate_path = match &self.target {
            Target::Directory { dir, .. } => Some(self.aggregate_path(dir)),
            Target::Writer(_) => None,
        };

        match &mut self.target {
            Target::Writer(writer) => {
                for line in lines {
                    writeln!(writer, "{}", line)?;
                }
                writer.flush()?;
            }
            Target::Directory {
                mode: OutputMode::PerDevice,
                ..
            } => {
                if let Some(path) = device_path {
                    let mut staged = stage(&path)?;
                    write_lines(&mut staged, lines)?;
                    commit(staged, &path)?;
                    self.committed.push(path);
                }
            }
            Target::Directory {
                mode: OutputMode::Aggregate,
                pending,
                ..
            } => {
                if pending.is_none() {
                    if let Some(path) = &aggregate_path {
                        *pending = Some(stage(path)?);
                    }
                }
                if let Some(staged) = pending.as_mut() {
                    write_lines(staged, lines)?;
                }
            }
        }
        Ok(())
    }

    /// Completes the run, committing the aggregate file if one is staged
    ///
    /// Returns every file made visible during the run.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        let aggregate_path = match &self.target {
            Target::Directory { dir, .. } => Some(self.aggregate_path(dir)),
            Target::Writer(_) => None,
        };

        if let Target::Directory { pending, .. } = &mut self.target {
            if let (Some(staged), Some(path)) = (pending.take(), aggregate_path) {
                commit(staged, &path)?;
                self.committed.push(path);
            }
        }
        Ok(self.committed)
    }

    /// Drops uncommitted output; the destination keeps its previous content
    pub fn abandon(mut self) -> Vec<PathBuf> {
        if let Target::Directory { pending, .. } = &mut self.target {
            if pending.take().is_some() {
                debug!("Discarded staged aggregate output");
            }
        }
        self.committed
    }
}

/// Atomically replaces `path` with `contents`
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            ExporterError::Output(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    let mut staged = stage(path)?;
    staged.write_all(contents)?;
    commit(staged, path)
}

/// Creates `.<name>.XXXXXX.tmp` beside `path`
fn stage(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            ExporterError::Output(format!("cannot stage {}: {}", path.display(), e))
        })
}

fn write_lines(staged: &mut NamedTempFile, lines: &[String]) -> Result<()> {
    for line in lines {
        writeln!(staged, "{}", line)?;
    }
    Ok(())
}

fn commit(mut staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.flush()?;
    staged.as_file().sync_all()?;

    // Temp files are created 0600; scrapers usually run as another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    staged.persist(path).map_err(|e| {
        ExporterError::Output(format!("cannot replace {}: {}", path.display(), e.error))
    })?;
    debug!("Atomically wrote {}", path.display());
    Ok(())
}
