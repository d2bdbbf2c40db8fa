//! Derived per-thread statistics and display helpers.
//!
//! Peaks show how much memory a thread held at its worst, per tier. Trimming and
//! downsampling shrink the raw maps before they are printed or plotted elsewhere.

use super::ledger::{EventCounts, Tier, TimeSeries};
use super::processor::TraceAnalysis;
use super::size_class::SizeHistogram;
use crate::parser::record::ThreadKey;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Peak and final values of one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPeak {
    pub tier: Tier,
    pub label: String,
    pub peak_bytes: u64,
    /// First timestamp at which `peak_bytes` was reached
    pub peak_bytes_at: u32,
    pub peak_count: u64,
    pub peak_count_at: u32,
    pub final_bytes: u64,
    pub final_count: u64,
}

/// Summary of one thread's allocation behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStats {
    pub events: EventCounts,
    /// Timestamp of the last sample
    pub last_event_ms: u32,
    /// Size classes with at least one malloc
    pub distinct_classes: usize,
    /// Blocks never freed
    pub residual_blocks: usize,
    pub diagnostics: usize,
    pub tiers: Vec<TierPeak>,
}

/// Statistics for every thread of an analysis
///
/// **Public** - main entry point for metrics calculation
pub fn calculate_all_stats(analysis: &TraceAnalysis) -> BTreeMap<ThreadKey, ThreadStats> {
    analysis
        .thread_keys()
        .filter_map(|key| calculate_thread_stats(analysis, key).map(|stats| (*key, stats)))
        .collect()
}

/// Statistics for one thread, `None` if the thread never appeared
pub fn calculate_thread_stats(analysis: &TraceAnalysis, key: &ThreadKey) -> Option<ThreadStats> {
    let usage = analysis.usage.get(key)?;
    let counts = analysis.counts.get(key)?;
    let histogram = analysis.histograms.get(key)?;

    let tiers = Tier::ALL
        .into_iter()
        .map(|tier| tier_peak(tier, usage, counts))
        .collect();

    let stats = ThreadStats {
        events: analysis.events.get(key).copied().unwrap_or_default(),
        last_event_ms: usage.keys().next_back().copied().unwrap_or(0),
        distinct_classes: histogram.values().filter(|&&count| count > 0).count(),
        residual_blocks: analysis.residual_blocks.get(key).copied().unwrap_or(0),
        diagnostics: analysis.thread_diagnostics(key).len(),
        tiers,
    };

    debug!(
        "[{}] {} events, peak {} bytes",
        key,
        stats.events.total(),
        stats.tiers.last().map(|t| t.peak_bytes).unwrap_or(0)
    );

    Some(stats)
}

/// Peak/final values of `tier` over both series
///
/// **Private** - internal helper for calculate_thread_stats
fn tier_peak(tier: Tier, usage: &TimeSeries, counts: &TimeSeries) -> TierPeak {
    let i = tier.index();
    let (peak_bytes_at, peak_bytes) = series_peak(usage, i);
    let (peak_count_at, peak_count) = series_peak(counts, i);

    TierPeak {
        tier,
        label: tier.label().to_string(),
        peak_bytes,
        peak_bytes_at,
        peak_count,
        peak_count_at,
        final_bytes: usage.values().next_back().map(|v| v[i]).unwrap_or(0),
        final_count: counts.values().next_back().map(|v| v[i]).unwrap_or(0),
    }
}

fn series_peak(series: &TimeSeries, tier: usize) -> (u32, u64) {
    series
        .iter()
        .fold((0, 0), |(at, peak), (&ts, values)| {
            if values[tier] > peak {
                (ts, values[tier])
            } else {
                (at, peak)
            }
        })
}

/// Drop the run of empty classes above the largest observed class
///
/// Empty classes below it are kept so the histogram keeps its shape.
/// A histogram with no observations trims to nothing.
pub fn trim_histogram(histogram: &SizeHistogram) -> SizeHistogram {
    let Some(&largest) = histogram
        .iter()
        .rev()
        .find(|(_, &count)| count > 0)
        .map(|(size, _)| size)
    else {
        return SizeHistogram::new();
    };

    histogram
        .range(..=largest)
        .map(|(&size, &count)| (size, count))
        .collect()
}

/// Keep every `step`-th sample in time order, starting with the first
///
/// A `step` of 0 or 1 keeps everything.
pub fn downsample_series(series: &TimeSeries, step: usize) -> TimeSeries {
    let step = step.max(1);

    series
        .iter()
        .enumerate()
        .filter(|(i, _)| i % step == 0)
        .map(|(_, (&ts, &values))| (ts, values))
        .collect()
}

/// Most requested classes, largest count first (ties by smaller size)
pub fn top_classes(histogram: &SizeHistogram, n: usize) -> Vec<(u64, u64)> {
    let mut classes: Vec<(u64, u64)> = histogram
        .iter()
        .filter(|(_, &count)| count > 0)
        .map(|(&size, &count)| (size, count))
        .collect();

    classes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    classes.truncate(n);
    classes
}
