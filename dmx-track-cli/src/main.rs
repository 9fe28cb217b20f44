//! DMX Track CLI Application
//!
//! Command-line front end for the dmx-track-core pipeline. It adds:
//! - Argument and config.toml handling
//! - A label-map resolver fed from a JSON bindings file
//! - A JSON export sink standing in for the animation host
//! - End-of-run summaries and exit codes

use anyhow::Result;
use clap::{Parser, ValueEnum};
use dmx_track_core::binder::label_for_pattern;
use dmx_track_core::{pipeline, ErrorPolicy, NameMapResolver};
use std::collections::HashMap;
use std::path::PathBuf;

mod config;
mod report;
mod sink;

use config::RunSettings;
use sink::JsonExportSink;

/// DMX Track - Convert DMX channel intensities into keyframe tracks
#[derive(Parser, Debug)]
#[command(name = "dmx-track")]
#[command(about = "Convert DMX channel intensity files into keyframe tracks", long_about = None)]
#[command(version)]
pub struct Args {
    /// Raw channel-intensity source file
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// CSV cache of the decoded table (default: source with .csv extension)
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Number of channels per frame (default: 64)
    #[arg(short = 'n', long, value_name = "COUNT")]
    channels: Option<usize>,

    /// Host frame rate, recorded in the output (default: 60)
    #[arg(long, value_name = "FPS")]
    fps: Option<f64>,

    /// Multiplier from normalized intensity to host units (default: 5000)
    #[arg(long, value_name = "MULTIPLIER")]
    scale: Option<f64>,

    /// Ignore an existing cache and decode the source again
    #[arg(long)]
    no_cache: bool,

    /// What to do with a line containing a malformed value
    #[arg(long, value_enum, value_name = "POLICY")]
    on_error: Option<ErrorPolicyArg>,

    /// Build keyframes for all channels in parallel
    #[arg(long)]
    parallel: bool,

    /// JSON file mapping scene labels to host targets
    #[arg(short, long, value_name = "FILE")]
    bindings: Option<PathBuf>,

    /// Label for channel i, with {i} replaced by the index (default: PointLight{i})
    #[arg(long, value_name = "PATTERN")]
    label_pattern: Option<String>,

    /// Output file for exported tracks (default: <source>.tracks.json)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Also write the build report as JSON
    #[arg(long, value_name = "FILE")]
    report_json: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only load the frame table and print per-channel statistics
    #[arg(long)]
    inspect: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ErrorPolicyArg {
    Abort,
    SkipLine,
}

impl From<ErrorPolicyArg> for ErrorPolicy {
    fn from(arg: ErrorPolicyArg) -> Self {
        match arg {
            ErrorPolicyArg::Abort => ErrorPolicy::Abort,
            ErrorPolicyArg::SkipLine => ErrorPolicy::SkipLine,
        }
    }
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("DMX Track CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using core library v{}", dmx_track_core::VERSION);

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            report::EXIT_FATAL
        }
    };

    std::process::exit(code);
}

/// Load settings and dispatch to inspect or build mode
fn run(args: &Args) -> Result<i32> {
    let file_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };
    let settings = config::resolve_settings(args, file_config)?;

    if args.inspect {
        inspect_mode(&settings, args.quiet)
    } else {
        build_mode(&settings, args.quiet)
    }
}

/// Inspect mode - load (or regenerate) the table and print statistics
fn inspect_mode(settings: &RunSettings, quiet: bool) -> Result<i32> {
    let (table, status, skipped) = pipeline::load_table(&settings.pipeline)?;

    if !quiet {
        report::print_table_stats(&table, status, settings.pipeline.frame_rate);
    }

    Ok(if skipped.is_empty() {
        report::EXIT_SUCCESS
    } else {
        report::EXIT_PARTIAL
    })
}

/// Build mode - run the full pipeline and export tracks
fn build_mode(settings: &RunSettings, quiet: bool) -> Result<i32> {
    let targets = match &settings.targets {
        Some(targets) => targets.clone(),
        None => self_targets(settings),
    };
    let mut resolver = NameMapResolver::new(targets).with_pattern(settings.label_pattern.clone());
    let mut sink = JsonExportSink::new(settings.pipeline.frame_rate);

    let outcome = pipeline::run(&settings.pipeline, &mut resolver, &mut sink, None)?;

    sink.write_to(&settings.tracks_output)?;
    if let Some(path) = &settings.report_output {
        report::write_report_json(&outcome, path)?;
    }

    if !quiet {
        report::print_summary(&outcome, settings.pipeline.frame_rate);
    }

    Ok(report::exit_code(&outcome))
}

/// Without a bindings map every channel targets its own label
fn self_targets(settings: &RunSettings) -> HashMap<String, String> {
    (0..settings.pipeline.decode.expected_arity)
        .map(|i| {
            let label = label_for_pattern(&settings.label_pattern, i);
            (label.clone(), label)
        })
        .collect()
}

/// Level for this workspace's own log targets
fn log_level(verbose: u8, quiet: bool) -> log::LevelFilter {
    use log::LevelFilter;

    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Initialize logging based on verbosity level
///
/// `-v`/`-q` apply to the pipeline and the CLI; other crates log warnings
/// only. `RUST_LOG`, when set, overrides both.
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = log_level(verbose, quiet);

    Builder::new()
        .filter_level(LevelFilter::Warn.min(level))
        .filter_module("dmx_track_core", level)
        .filter_module(module_path!(), level)
        .parse_default_env()
        .format(|buf, record| {
            let target = record.target().strip_prefix("dmx_track_core::").unwrap_or(record.target());
            writeln!(buf, "[{} {}] {}", record.level(), target, record.args())
        })
        .init();
}
