//! Alloc Trace Studio CLI
//!
//! Turns allocator shim traces into per-thread usage reports.

use alloc_trace_studio::commands::{
    display_schema, display_version, execute_analyze, validate_args, validate_report_file,
    AnalyzeArgs,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

/// Alloc Trace Studio - heap usage reconstruction from allocator traces
#[derive(Parser, Debug)]
#[command(name = "alloc-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a binary trace file
    Analyze {
        /// Trace file written by the allocator shim
        #[arg(short, long)]
        trace: PathBuf,

        /// Output path for JSON report
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Replay threads concurrently
        #[arg(long)]
        parallel: bool,

        /// Drop empty size classes above the largest observed one
        #[arg(long)]
        trim: bool,

        /// Keep every n-th time series sample in the report (10 when given without a value)
        #[arg(long, value_name = "N")]
        downsample_step: Option<Option<usize>>,

        /// Maximum number of diagnostics listed in the report
        #[arg(long)]
        max_diagnostics: Option<usize>,

        /// Size classes listed per thread in the summary
        #[arg(long, default_value = "10")]
        top_classes: usize,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Analyze {
            trace,
            output,
            summary,
            parallel,
            trim,
            downsample_step,
            max_diagnostics,
            top_classes,
        } => {
            let args = AnalyzeArgs {
                trace_file: trace,
                output_json: output,
                print_summary: summary,
                parallel,
                trim,
                downsample_step: AnalyzeArgs::resolve_downsample_step(downsample_step),
                max_diagnostics,
                top_classes,
            };

            validate_args(&args)?;
            execute_analyze(args)?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
