//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Reads the trace file
//! 2. Decodes and replays it per thread
//! 3. Builds the report
//! 4. Writes output files

use super::models::AnalyzeArgs;
use crate::aggregator::{process_trace, ProcessOptions};
use crate::output::{generate_text_summary, write_report};
use crate::parser::{read_trace_file, to_report, ReportOptions};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Instant;

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Trace file missing or unreadable
/// * Malformed trace (fatal, nothing is written)
/// * Report write errors
///
/// # Example
/// ```ignore
/// let args = AnalyzeArgs {
///     trace_file: PathBuf::from("app.trace"),
///     print_summary: true,
///     ..Default::default()
/// };
///
/// execute_analyze(args)?;
/// ```
pub fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    let start_time = Instant::now();

    info!("Analyzing trace: {}", args.trace_file.display());

    // Step 1: Read trace
    info!("Step 1/4: Reading trace file...");
    let buf = read_trace_file(&args.trace_file)
        .with_context(|| format!("Failed to read trace {}", args.trace_file.display()))?;

    debug!("Read {} bytes", buf.len());

    // Step 2: Replay
    info!("Step 2/4: Replaying allocation events...");
    let options = ProcessOptions {
        parallel: args.parallel,
    };
    let analysis = process_trace(&buf, options).context("Failed to process trace")?;

    let (missing, duplicate) = analysis.diagnostic_counts();
    info!(
        "Replayed {} records across {} threads",
        analysis.record_count,
        analysis.thread_count()
    );
    if missing + duplicate > 0 {
        warn!(
            "Trace is inconsistent: {} block-not-found, {} duplicate-block",
            missing, duplicate
        );
    }

    // Step 3: Build report
    info!("Step 3/4: Building report...");
    let report_options = ReportOptions {
        trim_histograms: args.trim,
        max_diagnostics: args.max_diagnostics,
        downsample_step: args.downsample_step,
    };
    let report = to_report(
        &analysis,
        &args.trace_file.display().to_string(),
        report_options,
    );

    // Step 4: Write outputs
    info!("Step 4/4: Writing output files...");
    write_report(&report, &args.output_json).context("Failed to write report JSON")?;

    info!("✓ Report written to: {}", args.output_json.display());

    if args.print_summary {
        println!("\n{}", "=".repeat(80));
        println!("ALLOCATION SUMMARY");
        println!("{}", "=".repeat(80));
        println!("{}", generate_text_summary(&report, args.top_classes));
        println!("{}", "=".repeat(80));
    }

    let elapsed = start_time.elapsed();
    info!("Analysis completed in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

/// Validate analyze arguments
///
/// **Public** - can be called before execute_analyze for early validation
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if args.trace_file.as_os_str().is_empty() {
        anyhow::bail!("Trace file path cannot be empty");
    }

    if !args.trace_file.is_file() {
        anyhow::bail!("Trace file not found: {}", args.trace_file.display());
    }

    if args.output_json.as_os_str().is_empty() {
        anyhow::bail!("Output path cannot be empty");
    }

    if args.downsample_step == Some(0) {
        anyhow::bail!("downsample step must be greater than 0");
    }

    if args.top_classes == 0 {
        anyhow::bail!("top_classes must be greater than 0");
    }

    if args.top_classes > 1000 {
        anyhow::bail!("top_classes is too large (max 1000)");
    }

    Ok(())
}
