//! Drive per-thread ledgers over a decoded trace.
//!
//! Records are keyed by `(pid, thread id)`. Each thread gets its own [`Ledger`],
//! seeded with a clone of the shared class grid, and sees only its own events in
//! file order. Threads share nothing, so they can also be replayed on a rayon pool.

use super::ledger::{Diagnostic, EventCounts, Ledger, LedgerOutput, TimeSeries};
use super::size_class::{build_bucket_grid, SizeHistogram};
use crate::parser::alloc_trace::parse_trace;
use crate::parser::record::{ThreadKey, TraceRecord};
use crate::utils::error::TraceError;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Knobs for a processing run
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Replay threads concurrently. Output is identical either way.
    pub parallel: bool,
}

/// Result of processing a whole trace, keyed by thread
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceAnalysis {
    pub record_count: usize,
    pub histograms: BTreeMap<ThreadKey, SizeHistogram>,
    pub usage: BTreeMap<ThreadKey, TimeSeries>,
    pub counts: BTreeMap<ThreadKey, TimeSeries>,
    pub events: BTreeMap<ThreadKey, EventCounts>,
    pub residual_blocks: BTreeMap<ThreadKey, usize>,
    /// Sorted by thread, then by position in the trace
    pub diagnostics: Vec<(ThreadKey, Diagnostic)>,
}

impl TraceAnalysis {
    pub fn thread_keys(&self) -> impl Iterator<Item = &ThreadKey> {
        self.histograms.keys()
    }

    pub fn thread_count(&self) -> usize {
        self.histograms.len()
    }

    /// (block-not-found, duplicate-block) totals across all threads
    pub fn diagnostic_counts(&self) -> (usize, usize) {
        self.diagnostics
            .iter()
            .fold((0, 0), |(missing, duplicate), (_, d)| match d {
                Diagnostic::BlockNotFound { .. } => (missing + 1, duplicate),
                Diagnostic::DuplicateBlock { .. } => (missing, duplicate + 1),
            })
    }

    /// Diagnostics of one thread, in trace order
    pub fn thread_diagnostics(&self, key: &ThreadKey) -> &[(ThreadKey, Diagnostic)] {
        let start = self.diagnostics.partition_point(|(k, _)| k < key);
        let end = self.diagnostics.partition_point(|(k, _)| k <= key);
        &self.diagnostics[start..end]
    }

    fn insert(&mut self, key: ThreadKey, output: LedgerOutput) {
        self.histograms.insert(key, output.histogram);
        self.usage.insert(key, output.usage);
        self.counts.insert(key, output.counts);
        self.events.insert(key, output.events);
        self.residual_blocks.insert(key, output.residual_blocks);
        self.diagnostics
            .extend(output.diagnostics.into_iter().map(|d| (key, d)));
    }
}

/// Decode and process a raw trace buffer
///
/// **Public** - main entry point of the core
///
/// The whole buffer is decoded before any replay, so a malformed trace yields
/// an error and no partial result.
///
/// # Errors
/// * `TraceError::MalformedTrace` - length not a multiple of the record size
/// * `TraceError::UnknownOpcode` - a record with an opcode outside 0..=3
pub fn process_trace(buf: &[u8], options: ProcessOptions) -> Result<TraceAnalysis, TraceError> {
    let records = parse_trace(buf)?;
    Ok(process_records(&records, options))
}

/// Replay already-decoded records
///
/// **Public** - useful when records come from somewhere other than a byte buffer
pub fn process_records(records: &[TraceRecord], options: ProcessOptions) -> TraceAnalysis {
    let grid = build_bucket_grid();
    debug!(
        "Processing {} records with {} size classes ({})",
        records.len(),
        grid.len(),
        if options.parallel { "parallel" } else { "sequential" }
    );

    let outputs = if options.parallel {
        replay_parallel(records, &grid)
    } else {
        replay_sequential(records, &grid)
    };

    let mut analysis = TraceAnalysis {
        record_count: records.len(),
        ..Default::default()
    };

    for (key, output) in outputs {
        analysis.insert(key, output);
    }

    debug!("Replayed {} threads", analysis.thread_count());

    analysis
}

/// Single pass over the trace, ledgers created on first sight of a thread
///
/// **Private** - internal helper for process_records
fn replay_sequential(
    records: &[TraceRecord],
    grid: &SizeHistogram,
) -> BTreeMap<ThreadKey, LedgerOutput> {
    let mut ledgers: BTreeMap<ThreadKey, Ledger> = BTreeMap::new();

    for record in records {
        let key = record.thread_key();
        ledgers
            .entry(key)
            .or_insert_with(|| {
                debug!("New thread: {}", key);
                Ledger::new(key, grid.clone())
            })
            .apply(record);
    }

    ledgers
        .into_iter()
        .map(|(key, ledger)| (key, ledger.finish()))
        .collect()
}

/// Partition by thread in file order, then replay each partition independently
///
/// **Private** - internal helper for process_records
fn replay_parallel(
    records: &[TraceRecord],
    grid: &SizeHistogram,
) -> BTreeMap<ThreadKey, LedgerOutput> {
    let mut partitions: BTreeMap<ThreadKey, Vec<&TraceRecord>> = BTreeMap::new();
    for record in records {
        partitions.entry(record.thread_key()).or_default().push(record);
    }

    debug!("Partitioned trace into {} threads", partitions.len());

    let partitions: Vec<(ThreadKey, Vec<&TraceRecord>)> = partitions.into_iter().collect();

    partitions
        .into_par_iter()
        .map(|(key, thread_records)| {
            let mut ledger = Ledger::new(key, grid.clone());
            for record in thread_records {
                ledger.apply(record);
            }
            (key, ledger.finish())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}
