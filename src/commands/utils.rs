use crate::output::read_report;
use crate::utils::config::{REPORT_SCHEMA_VERSION, TIER_LABELS};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Validate a report JSON file
pub fn validate_report_file(file_path: PathBuf) -> Result<()> {
    println!("Validating report: {}", file_path.display());

    let report = read_report(&file_path)
        .with_context(|| format!("Failed to load report {}", file_path.display()))?;

    if report.version != REPORT_SCHEMA_VERSION {
        anyhow::bail!(
            "Unsupported report version {} (expected {})",
            report.version,
            REPORT_SCHEMA_VERSION
        );
    }

    println!("✓ Valid report JSON");
    println!("  Version: {}", report.version);
    println!("  Trace: {}", report.trace_file);
    println!("  Records: {}", report.record_count);
    println!("  Threads: {}", report.threads.len());
    println!("  Diagnostics: {}", report.total_diagnostics());

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Alloc Trace Studio Report Schema");
    println!("Current Version: {}", REPORT_SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string            - Schema version (e.g., '1.0.0')");
        println!("  trace_file: string         - Trace the report was built from");
        println!("  record_count: number       - Records decoded");
        println!("  threads: object            - Keyed by \"<pid>:<thread id hex>\"");
        println!("    histogram: object        - Size class (bytes) -> malloc count");
        println!("    usage: object            - Time (ms) -> bytes in use per tier");
        println!("    counts: object           - Time (ms) -> live blocks per tier");
        println!("    stats: object            - Event counts, peaks per tier");
        println!("  diagnostics: object        - block_not_found / duplicate_block counts + entries");
        println!("  generated_at: string       - ISO 8601 timestamp");
        println!();
        println!("Tiers are cumulative: {}", TIER_LABELS.join(", "));
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Alloc Trace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", REPORT_SCHEMA_VERSION);
    println!();
    println!("Per-thread heap usage and size-class histograms from allocator traces.");
}
