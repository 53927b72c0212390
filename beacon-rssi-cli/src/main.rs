//! Beacon RSSI Replay CLI
//!
//! Command-line front end for the beacon-rssi-filter library. It replays
//! recorded RSSI sample logs through simulated ranging cycles and reports:
//! - Per-cycle running average and running max estimates
//! - Which transmitters were tracked in each cycle
//! - A summary of rejected, skipped and out-of-order samples
//!
//! Several sample logs can be given at once; each is replayed independently.

use anyhow::{Context, Result};
use beacon_rssi_filter::{DiagnosticSink, JsonDataLogger, NullSink};
use clap::Parser;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod replay;
mod report;

use config::{AppConfig, OutputFormat};

/// Beacon RSSI Replay - smooth recorded RSSI samples and track liveness
#[derive(Parser, Debug)]
#[command(name = "beacon-rssi-cli")]
#[command(about = "Replay recorded beacon RSSI samples through the ranging filters", long_about = None)]
#[command(version)]
struct Args {
    /// JSON-lines sample file(s) to replay (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    samples: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file for per-cycle estimates (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format, overrides the config file
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Ranging cycle length in milliseconds, overrides the config file
    #[arg(long, value_name = "MS")]
    cycle_ms: Option<u64>,

    /// Append diagnostic JSON records to this file
    #[arg(long, value_name = "FILE")]
    datalog: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Txt,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Txt => OutputFormat::Txt,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Beacon RSSI CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using filter library v{}", beacon_rssi_filter::VERSION);

    if args.samples.is_empty() {
        println!("Beacon RSSI Replay - No input specified");
        println!("\nQuick Start:");
        println!("  beacon-rssi-cli --samples hallway.jsonl");
        println!("  beacon-rssi-cli --samples a.jsonl --samples b.jsonl --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    let config = build_config(&args)?;
    let sink = build_sink(&config);
    run(&args, &config, sink)
}

/// Load the config file (if any) and apply command line overrides
fn build_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(cycle_ms) = args.cycle_ms {
        config.cycle.period_ms = cycle_ms;
    }
    if let Some(format) = args.format {
        config.output.format = format.into();
    }
    if let Some(path) = &args.output {
        config.output.path = Some(path.clone());
    }
    if let Some(path) = &args.datalog {
        config.datalog.enabled = true;
        config.datalog.path = Some(path.clone());
    }

    config.validate()?;
    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn build_sink(config: &AppConfig) -> Arc<dyn DiagnosticSink> {
    if !config.datalog.enabled {
        return Arc::new(NullSink);
    }

    let logger = JsonDataLogger::new();
    logger.set_enabled(true, config.datalog.path.clone());
    logger.set_crowded(config.datalog.crowded);
    logger.set_range(config.datalog.range);
    log::info!("Writing diagnostic records to {:?}", config.datalog.path);
    Arc::new(logger)
}

fn run(args: &Args, config: &AppConfig, sink: Arc<dyn DiagnosticSink>) -> Result<()> {
    // Each log gets its own registry and clock, so they replay in parallel
    let outcomes: Vec<Result<replay::ReplayOutcome>> = args
        .samples
        .par_iter()
        .map(|path| -> Result<replay::ReplayOutcome> {
            let sample_log = replay::read_samples(path)?;
            Ok(replay::replay(&sample_log, config, sink.clone()))
        })
        .collect();

    let mut out: Box<dyn Write> = match &config.output.path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut failures = 0;
    let mut finished = Vec::new();
    for (path, outcome) in args.samples.iter().zip(outcomes) {
        match outcome {
            Ok(outcome) => {
                report::write_cycles(out.as_mut(), &outcome, config.output.format)?;
                finished.push(outcome);
            }
            Err(e) => {
                log::error!("Failed to replay {:?}: {:#}", path, e);
                failures += 1;
            }
        }
    }
    out.flush()?;

    if !args.quiet {
        let stdout = io::stdout();
        let mut summary = stdout.lock();
        for outcome in &finished {
            report::write_summary(&mut summary, outcome)?;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} sample file(s) could not be replayed", failures, args.samples.len());
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_overrides_apply() {
        let args = Args::parse_from([
            "beacon-rssi-cli",
            "--samples",
            "a.jsonl",
            "--cycle-ms",
            "250",
            "--format",
            "json",
            "--datalog",
            "data.json",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.cycle.period_ms, 250);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.datalog.enabled);
        assert_eq!(config.datalog.path, Some(PathBuf::from("data.json")));
    }

    #[test]
    fn test_zero_cycle_is_rejected() {
        let args = Args::parse_from(["beacon-rssi-cli", "--samples", "a.jsonl", "--cycle-ms", "0"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_replay_to_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("samples.jsonl");
        let output = dir.path().join("out.txt");
        std::fs::write(
            &samples,
            "{\"t_ms\": 0, \"id\": \"a\", \"rssi\": -60}\n{\"t_ms\": 400, \"id\": \"a\", \"rssi\": -62}\n",
        )
        .unwrap();

        let args = Args::parse_from(vec![
            OsString::from("beacon-rssi-cli"),
            OsString::from("--samples"),
            samples.into_os_string(),
            OsString::from("--output"),
            output.clone().into_os_string(),
            OsString::from("--quiet"),
        ]);
        let config = build_config(&args).unwrap();
        run(&args, &config, Arc::new(NullSink)).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.lines().any(|line| line.contains(" a ") && line.contains("-60.00")));
    }
}
