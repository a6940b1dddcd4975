use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use console::Term;
use mesh_metrics::{
    config::{Config, NodeIdFormat, Transport},
    daemon::{self, Reload},
    device::{CommandInterface, DeviceInterface},
    error::ExporterError,
    exposition::MetricFormatter,
    metrics::ExporterMetrics,
    output::OutputSink,
    progress::ProgressTask,
    push::{parse_header_arg, PushPublisher},
    roster::{self, RosterSource},
    scheduler::{self, list_roster, PollContext, RunMode},
    shutdown::{ReloadSignal, ShutdownSignal},
    telemetry::TelemetryParser,
};
use secrecy::SecretString;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit status for setup failures where nothing was polled
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MESHMETRICS_CONFIG", default_value = "config/Default.toml")]
    config: String,

    /// Device roster, `-` reads standard input (overrides config)
    #[arg(short = 'f', long = "file")]
    file: Option<String>,

    /// Prompt for the roster pass-phrase
    #[arg(short = 'P', long = "password")]
    password: bool,

    /// Write .prom files into this directory instead of stdout
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// One file per device instead of one aggregate file
    #[arg(short, long)]
    individual: bool,

    /// List roster node ids; repeat (-ll) for full roster lines
    #[arg(short = 'l', long = "list", action = ArgAction::Count)]
    list: u8,

    /// Gateway transport
    #[arg(short, long, value_enum)]
    mode: Option<Transport>,

    /// Serial device or gateway host, depending on the mode
    #[arg(short, long)]
    port: Option<String>,

    /// Seconds to wait between devices
    #[arg(short = 't', long = "dwell-time")]
    dwell_time: Option<u64>,

    /// Spelling of the node label (`clean` drops the leading `!`)
    #[arg(long, value_enum)]
    node_id_format: Option<NodeIdFormat>,

    /// Push each device's metrics to this URL
    #[arg(long, env = "MESHMETRICS_PUSH_URL")]
    push_url: Option<String>,

    /// Push request timeout in seconds
    #[arg(long)]
    push_timeout: Option<u64>,

    /// Extra push header, `Name: value` (repeatable)
    #[arg(long = "push-header", value_name = "NAME: VALUE")]
    push_headers: Vec<String>,

    /// Debug logging of every intermediate value
    #[arg(short, long)]
    verbose: bool,

    /// Poll periodically until interrupted
    #[arg(long)]
    daemon: bool,

    /// Validate configuration, roster and device interface, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_tracing(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else if args.daemon {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("warn,mesh_metrics={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(args: Args) -> Result<u8> {
    info!(
        "Starting Meshtastic telemetry exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config(&args)?;

    let source = config.devices.source();
    if args.daemon && source == RosterSource::Stdin {
        return Err(ExporterError::Config(
            "daemon mode reloads the roster every cycle and cannot read it from stdin".to_string(),
        )
        .into());
    }

    let passphrase = read_passphrase(&args, &config)?;
    let roster = roster::load(&source, passphrase.as_ref())?;
    let roster_status = if roster.has_errors() { 1 } else { 0 };

    let run_mode = RunMode::from_list_count(args.list);
    if run_mode != RunMode::Collect {
        list_roster(&roster, run_mode, &mut io::stdout().lock())
            .context("Failed to print roster")?;
        return Ok(roster_status);
    }

    let device = CommandInterface::new(&config.device);
    device.preflight()?;

    if args.check {
        Term::stderr().write_line(&format!(
            "Configuration OK: {} devices, {} rejected roster lines, device command '{}'",
            roster.len(),
            roster.rejected.len(),
            config.device.command
        ))?;
        return Ok(roster_status);
    }

    let metrics = ExporterMetrics::new()?;
    let mut shutdown = ShutdownSignal::listen();

    if args.daemon {
        let reload_args = args.clone();
        let reload = Reload::new(ReloadSignal::listen(), move || load_config(&reload_args));
        daemon::run(
            config,
            &device,
            passphrase.as_ref(),
            metrics,
            shutdown,
            reload,
        )
        .await?;
        return Ok(0);
    }

    metrics.roster_devices.set(roster.len() as i64);
    metrics
        .roster_rejected_lines
        .set(roster.rejected.len() as i64);

    let parser = TelemetryParser::from_config(&config.polling);
    let formatter = MetricFormatter::from_config(&config.output);
    let publisher = PushPublisher::from_config(&config.push)?;
    let ctx = PollContext {
        device: &device,
        parser: &parser,
        formatter: &formatter,
        publisher: publisher.as_ref(),
        metrics: &metrics,
        dwell: Duration::from_secs(config.polling.dwell_seconds),
    };

    let sink = OutputSink::from_config(&config.output)?;
    let progress = ProgressTask::start(!args.verbose && Term::stderr().is_term());
    let outcome = scheduler::run_collection(&ctx, &roster, sink, &mut shutdown, &progress).await;
    progress.finish().await;
    let result = outcome?;

    for path in &result.written {
        info!("Wrote {}", path.display());
    }
    info!(
        "{}/{} devices live, {} device errors, {} rejected roster lines, {} pushes failed",
        result.live_devices(),
        result.devices_polled(),
        result.device_errors,
        result.record_errors,
        result.push_failures
    );

    Ok(result.exit_code())
}

/// Configuration file plus command-line overrides, validated
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)?;
    apply_overrides(&mut config, args)?;
    config.validate()?;
    Ok(config)
}

/// Applies command-line flags on top of the loaded configuration
fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(file) = &args.file {
        config.devices.file = file.clone();
    }
    if let Some(directory) = &args.directory {
        config.output.directory = Some(directory.clone());
    }
    if args.individual {
        config.output.individual_files = true;
    }
    if let Some(mode) = args.mode {
        config.device.mode = mode;
    }
    if let Some(port) = &args.port {
        config.device.port = port.clone();
    }
    if let Some(dwell) = args.dwell_time {
        config.polling.dwell_seconds = dwell;
    }
    if let Some(format) = args.node_id_format {
        config.output.node_id_format = format;
    }
    if let Some(url) = &args.push_url {
        config.push.url = Some(url.clone());
    }
    if let Some(timeout) = args.push_timeout {
        config.push.timeout_seconds = timeout;
    }
    for header in &args.push_headers {
        let (name, value) = parse_header_arg(header).ok_or_else(|| {
            ExporterError::Config(format!("push header '{}' is not 'Name: value'", header))
        })?;
        config.push.headers.insert(name, value);
    }
    Ok(())
}

/// Pass-phrase from the interactive prompt or `devices.passphrase_file`
fn read_passphrase(args: &Args, config: &Config) -> Result<Option<SecretString>> {
    if args.password {
        let term = Term::stderr();
        term.write_str("Roster pass-phrase: ")?;
        let phrase = term
            .read_secure_line()
            .context("Failed to read roster pass-phrase")?;
        return Ok(Some(SecretString::new(phrase.into())));
    }

    if let Some(path) = &config.devices.passphrase_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pass-phrase file {}", path.display()))?;
        let phrase = contents.lines().next().unwrap_or_default().to_string();
        return Ok(Some(SecretString::new(phrase.into())));
    }

    Ok(None)
}
