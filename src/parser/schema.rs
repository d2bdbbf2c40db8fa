//! Output JSON schema definitions for analysis reports.
//!
//! This module defines the structure of JSON files we write to disk.
//! Schema is versioned to allow future evolution.

use crate::aggregator::ledger::{Diagnostic, TimeSeries};
use crate::aggregator::metrics::{calculate_all_stats, downsample_series, trim_histogram, ThreadStats};
use crate::aggregator::processor::TraceAnalysis;
use crate::aggregator::size_class::SizeHistogram;
use crate::parser::record::ThreadKey;
use crate::utils::config::REPORT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level report structure written to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version for compatibility checking
    pub version: String,

    /// Trace file the report was built from
    pub trace_file: String,

    /// Number of records decoded
    pub record_count: usize,

    /// Per-thread results, keyed by `"<pid>:<thread id>"`
    pub threads: BTreeMap<ThreadKey, ThreadReport>,

    /// Inconsistencies found while replaying
    pub diagnostics: DiagnosticReport,

    /// Timestamp when report was generated
    pub generated_at: String,
}

/// Everything computed for one thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReport {
    /// Classified request size -> malloc count
    pub histogram: SizeHistogram,

    /// Timestamp (ms) -> cumulative bytes in use per tier
    pub usage: TimeSeries,

    /// Timestamp (ms) -> cumulative live blocks per tier
    pub counts: TimeSeries,

    pub stats: ThreadStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub block_not_found: usize,
    pub duplicate_block: usize,

    /// Set when `entries` holds fewer diagnostics than were found
    pub truncated: bool,

    pub entries: Vec<DiagnosticEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub thread: ThreadKey,
    pub diagnostic: Diagnostic,
}

/// How much of an analysis goes into the report
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Drop empty classes above the largest observed one
    pub trim_histograms: bool,

    /// Cap on listed diagnostics (counts are always complete)
    pub max_diagnostics: Option<usize>,

    /// Keep only every n-th sample of the time series. Stats are always
    /// computed on the full series.
    pub downsample_step: Option<usize>,
}

impl Report {
    pub fn total_diagnostics(&self) -> usize {
        self.diagnostics.block_not_found + self.diagnostics.duplicate_block
    }
}

/// Convert an analysis to the output report format
///
/// **Public** - used by commands to create final output
pub fn to_report(
    analysis: &TraceAnalysis,
    trace_file: &str,
    options: ReportOptions,
) -> Report {
    use chrono::Utc;

    let mut stats = calculate_all_stats(analysis);

    let threads = analysis
        .thread_keys()
        .filter_map(|key| {
            let histogram = analysis.histograms.get(key)?;
            let thread = ThreadReport {
                histogram: if options.trim_histograms {
                    trim_histogram(histogram)
                } else {
                    histogram.clone()
                },
                usage: thin(analysis.usage.get(key)?, options.downsample_step),
                counts: thin(analysis.counts.get(key)?, options.downsample_step),
                stats: stats.remove(key)?,
            };
            Some((*key, thread))
        })
        .collect();

    let (block_not_found, duplicate_block) = analysis.diagnostic_counts();
    let limit = options.max_diagnostics.unwrap_or(usize::MAX);
    let entries: Vec<DiagnosticEntry> = analysis
        .diagnostics
        .iter()
        .take(limit)
        .map(|(thread, diagnostic)| DiagnosticEntry {
            thread: *thread,
            diagnostic: *diagnostic,
        })
        .collect();

    Report {
        version: REPORT_SCHEMA_VERSION.to_string(),
        trace_file: trace_file.to_string(),
        record_count: analysis.record_count,
        threads,
        diagnostics: DiagnosticReport {
            block_not_found,
            duplicate_block,
            truncated: entries.len() < analysis.diagnostics.len(),
            entries,
        },
        generated_at: Utc::now().to_rfc3339(),
    }
}

fn thin(series: &TimeSeries, step: Option<usize>) -> TimeSeries {
    match step {
        Some(step) => downsample_series(series, step),
        None => series.clone(),
    }
}
