//! Command-line interface for `GeoProc`, a streaming processor for vector features.
//!
//! This binary parses a pipeline of stages, configures logging and hands the
//! pipeline to the [`geoproc_core`] library.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! Log output goes to stderr so that a `load -o -` stage can stream to stdout.
//!
//! # Available Commands
//!
//! - `<stage> [options] <stage> [options]...` - Run a pipeline, e.g.
//!   `geoproc cat -i in.geojson buffer --dist 5 load -o out.geojson`
//! - `convert` - Convert data between formats
//! - `info` - Display dataset information and metadata
//! - `drivers` - List all known format drivers and their capabilities

mod display;
mod stages;

use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geoproc_core::drivers::get_drivers;
use geoproc_core::{FailurePolicy, GeoProcError, operations};

#[derive(Parser)]
#[command(
    name = "geoproc",
    version,
    about = "Streaming vector geoprocessing pipelines in Rust",
    long_about = "GeoProc chains stages that read, transform and write vector features one at a time.\n\
                  Stages are written one after another, each followed by its options:\n\n  \
                  geoproc cat -i roads.geojson reproject --dst-crs EPSG:3857 buffer --dist 10 load -o out.geojson"
)]
/// Command-line arguments and options for the `GeoProc` CLI.
///
/// Global flags must precede the first stage of a pipeline.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log and drop features that fail to transform instead of stopping.
    #[arg(long, global = true)]
    skip_failures: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `GeoProc` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Converts data between different vector geospatial formats.
    Convert {
        /// Path to the input dataset.
        #[arg(short, long, value_name = "DATASET")]
        input: String,

        /// Path for the output dataset.
        #[arg(short, long, value_name = "DATASET")]
        output: String,

        /// The driver to use for reading the input dataset (e.g., "`GeoJSON`").
        #[arg(long, value_name = "DRIVER")]
        input_driver: Option<String>,

        /// The driver to use for writing the output dataset (e.g., "`GeoJSONSeq`").
        #[arg(long, value_name = "DRIVER")]
        output_driver: Option<String>,
    },

    /// Displays information about a vector dataset.
    Info {
        /// Path to the input dataset.
        #[arg(value_name = "DATASET")]
        input: String,
    },

    /// Lists all known drivers and their capabilities.
    Drivers,

    /// A pipeline of stages: cat, buffer, centroid, simplify, reproject, filter, load.
    #[command(external_subcommand)]
    Pipeline(Vec<String>),
}

/// Entry point for the `GeoProc` command-line interface.
///
/// Exits with a non-zero status if the command fails.
fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli) {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        },
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn execute(cli: Cli) -> Result<()> {
    let policy = FailurePolicy::from_skip_flag(cli.skip_failures);
    match cli.command {
        Commands::Convert {
            input,
            output,
            input_driver,
            output_driver,
        } => {
            info!("Converting {input} to {output}");
            handle_convert(
                &input,
                &output,
                input_driver.as_deref(),
                output_driver.as_deref(),
            )
        },
        Commands::Info { input } => {
            info!("Displaying info for {input}");
            handle_info(&input)
        },
        Commands::Drivers => {
            handle_drivers();
            Ok(())
        },
        Commands::Pipeline(args) => handle_pipeline(&args, policy),
    }
}

/// Prints an error with the library's user message and suggestion when available.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<GeoProcError>() {
        Some(err) => {
            eprintln!("Error: {}", err.user_message());
            if let Some(suggestion) = err.recovery_suggestion() {
                eprintln!("Hint: {suggestion}");
            }
        },
        None => eprintln!("Error: {err:#}"),
    }
}

fn handle_pipeline(args: &[String], policy: FailurePolicy) -> Result<()> {
    let first = args.first().map(String::as_str).unwrap_or_default();
    if !stages::STAGE_NAMES.contains(&first) {
        return Err(anyhow!(
            "Unknown command or stage '{first}'. Stages: {}",
            stages::STAGE_NAMES.join(", ")
        ));
    }

    let specs = match stages::parse_stages(args) {
        Ok(specs) => specs,
        Err(err) => err.exit(),
    };
    debug!("Parsed {} stage(s)", specs.len());

    let report = operations::run_pipeline(specs, policy)?;
    info!(
        "Pipeline finished: {} feature(s) out, {} written, {} skipped",
        report.features, report.written, report.skipped
    );
    Ok(())
}

fn handle_convert(
    input: &str,
    output: &str,
    input_driver: Option<&str>,
    output_driver: Option<&str>,
) -> Result<()> {
    let report = operations::convert(input, output, input_driver, output_driver)?;
    info!(
        "Conversion complete: {} feature(s) written as {}",
        report.written, report.meta.driver
    );
    Ok(())
}

fn handle_info(input: &str) -> Result<()> {
    let info = operations::dataset_info(input)?;
    display::display_dataset_info(&info);
    Ok(())
}

/// Handles the `drivers` subcommand by displaying a formatted table of known drivers.
fn handle_drivers() {
    let drivers = get_drivers();
    println!("\nDrivers ({} total):\n", drivers.len());
    println!("{}", display::drivers_table(&drivers));
}
