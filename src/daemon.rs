//! Daemon Mode
//!
//! Repeats the collection cycle every `daemon.poll_interval_seconds` until a
//! shutdown is requested.
//!
//! Each cycle:
//! 1. Reloads the roster, so edits take effect without a restart
//! 2. Polls every device and commits the output files
//! 3. Publishes the cycle to the HTTP server (when enabled)
//! 4. Updates self-metrics and rewrites the stats file (when configured)
//!
//! A failed cycle is logged and counted; the next one runs on schedule.
//!
//! A reload request (SIGHUP) re-reads the configuration between cycles. Polling,
//! output, push and interval settings follow the new file; the device command
//! and the HTTP server keep their startup settings. A configuration that fails
//! to load leaves the previous one in effect.

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use secrecy::SecretString;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::device::DeviceInterface;
use crate::error::ExporterError;
use crate::exposition::MetricFormatter;
use crate::metrics::ExporterMetrics;
use crate::output::OutputSink;
use crate::progress::ProgressTask;
use crate::push::PushPublisher;
use crate::roster::{self, RosterSource};
use crate::scheduler::{self, PollContext, RunResult};
use crate::server::{self, ServerState};
use crate::shutdown::{ReloadSignal, ShutdownSignal};
use crate::stats::DaemonStats;
use crate::telemetry::TelemetryParser;

type ConfigLoader = Box<dyn Fn() -> anyhow::Result<Config> + Send>;

/// Where a fresh configuration comes from when a reload is requested
pub struct Reload {
    signal: ReloadSignal,
    load: ConfigLoader,
}

impl Reload {
    pub fn new(
        signal: ReloadSignal,
        load: impl Fn() -> anyhow::Result<Config> + Send + 'static,
    ) -> Self {
        Self {
            signal,
            load: Box::new(load),
        }
    }

    /// Never requests a reload
    pub fn disabled() -> Self {
        let (_, signal) = ReloadSignal::manual();
        Self::new(signal, || anyhow::bail!("configuration reload is disabled"))
    }
}

/// Everything a cycle needs that is derived from the configuration
struct CyclePlan {
    config: Config,
    parser: TelemetryParser,
    formatter: MetricFormatter,
    publisher: Option<PushPublisher>,
}

impl CyclePlan {
    fn new(config: Config) -> anyhow::Result<Self> {
        if config.devices.source() == RosterSource::Stdin {
            return Err(ExporterError::Config(
                "daemon mode reloads the roster every cycle and cannot read it from stdin"
                    .to_string(),
            )
            .into());
        }

        Ok(Self {
            parser: TelemetryParser::from_config(&config.polling),
            formatter: MetricFormatter::from_config(&config.output),
            publisher: PushPublisher::from_config(&config.push)?,
            config,
        })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.daemon.poll_interval_seconds)
    }

    fn context<'a, D>(
        &'a self,
        device: &'a D,
        metrics: &'a ExporterMetrics,
    ) -> PollContext<'a, D> {
        PollContext {
            device,
            parser: &self.parser,
            formatter: &self.formatter,
            publisher: self.publisher.as_ref(),
            metrics,
            dwell: Duration::from_secs(self.config.polling.dwell_seconds),
        }
    }
}

enum Wake {
    Tick,
    Reload,
    Shutdown,
}

fn cycle_ticker(start: tokio::time::Instant, period: Duration) -> Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Runs collection cycles until `shutdown` fires
pub async fn run<D: DeviceInterface>(
    config: Config,
    device: &D,
    passphrase: Option<&SecretString>,
    metrics: ExporterMetrics,
    shutdown: ShutdownSignal,
    reload: Reload,
) -> anyhow::Result<()> {
    let state = ServerState::new(metrics.clone());
    let server_task = if config.server.enabled {
        let listener = server::bind(&config.server).await?;
        let (state, shutdown) = (state.clone(), shutdown.clone());
        Some(tokio::spawn(server::serve(listener, state, shutdown)))
    } else {
        None
    };

    let Reload {
        signal: mut reload_signal,
        load,
    } = reload;
    let mut plan = CyclePlan::new(config)?;
    let mut stats = DaemonStats::new(Utc::now());
    let mut ticker = cycle_ticker(tokio::time::Instant::now(), plan.poll_interval());
    let mut cycle_shutdown = shutdown.clone();

    info!(
        "Daemon started, polling every {}s",
        plan.config.daemon.poll_interval_seconds
    );

    loop {
        let wake = tokio::select! {
            _ = ticker.tick() => Wake::Tick,
            _ = reload_signal.wait() => Wake::Reload,
            _ = cycle_shutdown.wait() => Wake::Shutdown,
        };

        match wake {
            Wake::Tick => {}
            Wake::Shutdown => break,
            Wake::Reload => {
                match load().and_then(CyclePlan::new) {
                    Ok(next) => {
                        if next.poll_interval() != plan.poll_interval() {
                            let period = next.poll_interval();
                            ticker = cycle_ticker(tokio::time::Instant::now() + period, period);
                        }
                        plan = next;
                        info!(
                            "Configuration reloaded, polling every {}s",
                            plan.config.daemon.poll_interval_seconds
                        );
                    }
                    Err(e) => error!(
                        "Configuration reload failed, keeping the previous one: {:#}",
                        e
                    ),
                }
                continue;
            }
        }

        let started = Instant::now();
        let ctx = plan.context(device, &metrics);
        let outcome = run_cycle(&ctx, &plan.config, passphrase, &mut cycle_shutdown).await;
        let finished = Utc::now();

        metrics.cycles_total.inc();
        metrics
            .last_cycle_duration_seconds
            .set(started.elapsed().as_secs_f64());
        metrics
            .last_cycle_timestamp_seconds
            .set(finished.timestamp_millis() as f64 / 1000.0);

        let interrupted = match outcome {
            Ok(result) => {
                info!(
                    "Cycle finished: {}/{} devices live, {} device errors, {} rejected lines",
                    result.live_devices(),
                    result.devices_polled(),
                    result.device_errors,
                    result.record_errors
                );
                state
                    .publish_cycle(result.exposition(), result.live_devices() > 0)
                    .await;
                stats.record_cycle(&result, finished);
                result.interrupted
            }
            Err(e) => {
                error!("Poll cycle failed: {:#}", e);
                state.publish_cycle(String::new(), false).await;
                stats.record_failed_cycle(finished);
                false
            }
        };

        if let Some(path) = &plan.config.daemon.stats_file {
            match stats.write(path) {
                Ok(()) => debug!("Stats written to {}", path.display()),
                Err(e) => warn!("Failed to write stats file {}: {}", path.display(), e),
            }
        }

        if interrupted {
            break;
        }
    }

    info!("Daemon stopping");
    if let Some(task) = server_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Server error: {:#}", e),
            Err(e) => error!("Server task failed: {}", e),
        }
    }
    Ok(())
}

async fn run_cycle<D: DeviceInterface>(
    ctx: &PollContext<'_, D>,
    config: &Config,
    passphrase: Option<&SecretString>,
    shutdown: &mut ShutdownSignal,
) -> anyhow::Result<RunResult> {
    let roster = roster::load(&config.devices.source(), passphrase)
        .context("Failed to load device roster")?;
    ctx.metrics.roster_devices.set(roster.len() as i64);
    ctx.metrics
        .roster_rejected_lines
        .set(roster.rejected.len() as i64);

    let sink = OutputSink::from_config(&config.output)?;
    let result =
        scheduler::run_collection(ctx, &roster, sink, shutdown, &ProgressTask::disabled()).await?;
    Ok(result)
}
