//! Aggregation of decoded trace records into per-thread views.
//!
//! This module transforms the flat event stream into:
//! - Size-class histograms of malloc requests
//! - Live usage and live block count over time, per size tier
//! - Per-thread peak statistics

pub mod ledger;
pub mod metrics;
pub mod processor;
pub mod size_class;

// Re-export main types and functions
pub use ledger::{Diagnostic, EventCounts, Ledger, LedgerOutput, Tier, TierVector, TimeSeries};
pub use metrics::{
    calculate_all_stats, calculate_thread_stats, downsample_series, top_classes, trim_histogram,
    ThreadStats, TierPeak,
};
pub use processor::{process_records, process_trace, ProcessOptions, TraceAnalysis};
pub use size_class::{build_bucket_grid, bucket_boundaries, classified_size, classify, SizeHistogram};
