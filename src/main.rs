use chrono::{Local, TimeDelta};
use clap::Parser;
use latency_collector::config::CollectorConfig;
use latency_collector::{
    CommandStreamSource, FileStreamSource, LatencyHelper, MetricResult, StreamSource,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Capture a device log slice, extract the configured latency metrics and
/// print them.
#[derive(Parser, Debug)]
#[command(name = "latency-collector", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "collector.toml")]
    config: PathBuf,

    /// Replay a saved capture instead of running the capture command
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// How far back the capture window reaches, in seconds
    #[arg(long, default_value_t = 300)]
    lookback_secs: u32,

    /// Print metrics as a JSON object
    #[arg(long)]
    json: bool,

    /// Validate config and print resolved settings, don't capture
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-record decisions, capture command details)
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "latency collection failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CollectorConfig::load(&cli.config)?;
    let patterns = config.patterns()?;

    if cli.dry_run {
        print_resolved(cli, &config);
        return Ok(());
    }

    let source: Box<dyn StreamSource> = match &cli.input {
        Some(path) => Box::new(FileStreamSource::new(path)),
        None => Box::new(CommandStreamSource::from_config(&config.capture)),
    };

    let mut helper = LatencyHelper::new(patterns, config.filter(), source);
    // A one-shot run has no test body to bracket, so look back from now.
    helper.set_window_start(Local::now() - TimeDelta::seconds(i64::from(cli.lookback_secs)));
    let metrics = helper.get_metrics()?;
    helper.stop_collecting();

    print_metrics(&metrics, &config.metric_names(), cli.json)?;
    Ok(())
}

fn print_resolved(cli: &Cli, config: &CollectorConfig) {
    println!("latency-collector v{}", env!("CARGO_PKG_VERSION"));
    println!("Config file: {}", cli.config.display());
    match &cli.input {
        Some(path) => println!("Input: {}", path.display()),
        None => println!(
            "Capture: {} {} (timeout {}s)",
            config.capture.command,
            config.capture.args.join(" "),
            config.capture.timeout_secs
        ),
    }
    println!("Filter: {}", config.filter());
    println!("Lookback: {}s", cli.lookback_secs);
    for name in config.metric_names() {
        println!("Metric: {name}");
    }
    println!("Dry run mode: config validated, not capturing.");
}

fn print_metrics(
    metrics: &MetricResult,
    configured: &[String],
    json: bool,
) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(metrics)?);
        return Ok(());
    }
    for name in configured {
        match metrics.get(name) {
            Some(value) => println!("{name}: {value}"),
            None => tracing::warn!(metric = %name, "metric not found in capture"),
        }
    }
    Ok(())
}
