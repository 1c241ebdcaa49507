use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use lem_descent::{
    convert_file, format_timestamp, Conversion, Coordinate, DescentError, Params, DEFAULT_INPUT,
    DEFAULT_OUTPUT,
};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Apollo 11 LM descent KML to keyframe asset converter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert the descent markers into a keyframe asset
    Convert(ConvertArgs),
    /// Print the extracted keyframes and landing offset as JSON
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct MarkerArgs {
    /// KML document holding the descent markers
    #[arg(default_value = DEFAULT_INPUT, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// JSON file with conversion parameters; flags below override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Name of the marker folder in the KML
    #[arg(long)]
    group: Option<String>,

    /// Touchdown instant (RFC 3339) the marker times count back from
    #[arg(long, value_parser = parse_touchdown)]
    touchdown: Option<DateTime<Utc>>,

    /// Target landing longitude (degrees)
    #[arg(long, allow_hyphen_values = true)]
    landing_lon: Option<f64>,

    /// Target landing latitude (degrees)
    #[arg(long, allow_hyphen_values = true)]
    landing_lat: Option<f64>,

    /// Target landing altitude (meters relative to the reference ellipsoid)
    #[arg(long, allow_hyphen_values = true)]
    landing_alt: Option<f64>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    #[command(flatten)]
    markers: MarkerArgs,

    /// Output asset path (`-` for stdout)
    #[arg(short, long, default_value = DEFAULT_OUTPUT, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Globe the translations are attached to (default: Moon)
    #[arg(long)]
    globe: Option<String>,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    #[command(flatten)]
    markers: MarkerArgs,
}

fn parse_touchdown(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{value}': {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Convert(args) => args.markers.verbose,
        Command::Inspect(args) => args.markers.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Convert(args) => handle_convert(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn load_params(path: &Path) -> Result<Params> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn build_params(args: &MarkerArgs) -> Result<Params> {
    let mut params = match args.config.as_ref() {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };
    if let Some(group) = args.group.as_ref() {
        params.group_name = group.clone();
    }
    if let Some(touchdown) = args.touchdown {
        params.touchdown = touchdown;
    }
    let spot = params.landing_spot;
    params.landing_spot = Coordinate::new(
        args.landing_lon.unwrap_or(spot.longitude),
        args.landing_lat.unwrap_or(spot.latitude),
        args.landing_alt.unwrap_or(spot.altitude),
    );
    params.source_name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());
    Ok(params)
}

fn load_conversion(path: &Path, params: &Params) -> Result<Conversion> {
    match convert_file(path, params) {
        Err(DescentError::GroupNotFound(group)) => {
            error!("No descent markers were found.");
            Err(DescentError::GroupNotFound(group).into())
        }
        other => other.with_context(|| format!("failed to convert {}", path.display())),
    }
}

fn handle_convert(args: ConvertArgs) -> Result<()> {
    let mut params = build_params(&args.markers)?;
    if let Some(globe) = args.globe.as_ref() {
        params.globe = globe.clone();
    }

    let conversion = load_conversion(&args.markers.input, &params)?;
    let asset = conversion.render(&params);

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(asset.as_bytes())?;
        handle.flush()?;
    } else {
        fs::write(&args.output, asset)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!(
            "Wrote {} keyframes to {}",
            conversion.positions.len(),
            args.output.display()
        );
    }
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let params = build_params(&args.markers)?;
    let conversion = load_conversion(&args.markers.input, &params)?;

    let keyframes: Vec<_> = conversion
        .positions
        .iter()
        .zip(conversion.corrected())
        .map(|(raw, shifted)| {
            json!({
                "timestamp": format_timestamp(&raw.timestamp),
                "original": raw.coordinate,
                "corrected": shifted.coordinate,
            })
        })
        .collect();
    let report = json!({
        "source": args.markers.input.display().to_string(),
        "group": params.group_name,
        "touchdown": params.touchdown.to_rfc3339(),
        "landing": {
            "timestamp": format_timestamp(&conversion.landing.timestamp),
            "original": conversion.landing.coordinate,
            "target": params.landing_spot,
        },
        "offset": conversion.offset,
        "keyframes": keyframes,
    });

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &report)?;
    writeln!(handle)?;
    Ok(())
}
