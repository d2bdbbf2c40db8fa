//! Per-thread replay of allocation events.
//!
//! A [`Ledger`] owns the live-block table of one thread and keeps two tier vectors
//! in step with it: bytes in use and number of live blocks. Tiers are cumulative,
//! so tier `i` covers every live block smaller than `TIER_THRESHOLDS[i]`.
//! After each event both vectors are snapshotted under the event's timestamp.
//!
//! Inconsistent events (freeing an unknown address, allocating over a live one)
//! never abort the replay. They are logged and collected as [`Diagnostic`]s.

use super::size_class::{classified_size, SizeHistogram};
use crate::parser::record::{Opcode, ThreadKey, TraceRecord};
use crate::utils::config::{TIER_COUNT, TIER_LABELS, TIER_THRESHOLDS};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One value per tier, smallest tier first
pub type TierVector = [u64; TIER_COUNT];

/// Timestamp (ms) -> tier vector after the last event at that millisecond
pub type TimeSeries = BTreeMap<u32, TierVector>;

/// Size band of a single block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// < 64B
    Tiny,
    /// [64B, 4KiB)
    Small,
    /// [4KiB, 32KiB)
    Medium,
    /// >= 32KiB
    Large,
}

impl Tier {
    pub const ALL: [Tier; TIER_COUNT] = [Tier::Tiny, Tier::Small, Tier::Medium, Tier::Large];

    /// Every cumulative tier a block of `size` bytes counts towards
    pub fn covering(size: u64) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |tier| size < tier.threshold())
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Exclusive upper bound of the tier
    pub fn threshold(self) -> u64 {
        TIER_THRESHOLDS[self.index()]
    }

    pub fn label(self) -> &'static str {
        TIER_LABELS[self.index()]
    }
}

/// Recoverable inconsistency found while replaying a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// free/realloc of an address that is not live
    BlockNotFound { op: Opcode, address: u32, timestamp: u32 },
    /// malloc/realloc/memalign returned an address that is still live
    DuplicateBlock { op: Opcode, address: u32, timestamp: u32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::BlockNotFound { op, address, timestamp } => {
                write!(f, "{}@{}: block at address {:x} not found!", op, timestamp, address)
            }
            Diagnostic::DuplicateBlock { op, address, timestamp } => {
                write!(f, "{}@{}: block at address {:x} already exists!", op, timestamp, address)
            }
        }
    }
}

/// Number of events seen per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub free: u64,
    pub malloc: u64,
    pub realloc: u64,
    pub memalign: u64,
}

impl EventCounts {
    pub fn record(&mut self, op: Opcode) {
        match op {
            Opcode::Free => self.free += 1,
            Opcode::Malloc => self.malloc += 1,
            Opcode::Realloc => self.realloc += 1,
            Opcode::Memalign => self.memalign += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.free + self.malloc + self.realloc + self.memalign
    }
}

/// Everything a finished ledger hands back to the processor
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutput {
    pub histogram: SizeHistogram,
    pub usage: TimeSeries,
    pub counts: TimeSeries,
    pub events: EventCounts,
    pub diagnostics: Vec<Diagnostic>,
    /// Blocks still live at the end of the trace
    pub residual_blocks: usize,
}

/// Live-block state machine for one thread
#[derive(Debug, Clone)]
pub struct Ledger {
    key: ThreadKey,
    live_blocks: HashMap<u32, u32>,
    used_bytes: TierVector,
    live_count: TierVector,
    usage: TimeSeries,
    counts: TimeSeries,
    histogram: SizeHistogram,
    events: EventCounts,
    diagnostics: Vec<Diagnostic>,
}

impl Ledger {
    /// Create an empty ledger
    ///
    /// `histogram` is the zero-filled class skeleton from
    /// [`build_bucket_grid`](super::size_class::build_bucket_grid). Both series
    /// start with an all-zero sample at t=0.
    pub fn new(key: ThreadKey, histogram: SizeHistogram) -> Self {
        let mut usage = TimeSeries::new();
        let mut counts = TimeSeries::new();
        usage.insert(0, [0; TIER_COUNT]);
        counts.insert(0, [0; TIER_COUNT]);

        Self {
            key,
            live_blocks: HashMap::new(),
            used_bytes: [0; TIER_COUNT],
            live_count: [0; TIER_COUNT],
            usage,
            counts,
            histogram,
            events: EventCounts::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Replay one event of this thread
    pub fn apply(&mut self, record: &TraceRecord) {
        let ts = record.time_ms;
        self.events.record(record.opcode);

        match record.opcode {
            Opcode::Free => {
                self.release(Opcode::Free, record.free_ptr(), ts);
            }
            Opcode::Malloc => {
                let size = record.arg0;
                self.check_duplicate(Opcode::Malloc, record.result, ts);
                self.insert(record.result, size);
                *self.histogram.entry(classified_size(size as u64)).or_insert(0) += 1;
            }
            Opcode::Realloc => {
                let old_ptr = record.realloc_old_ptr();
                if record.result != old_ptr {
                    self.check_duplicate(Opcode::Realloc, record.result, ts);
                }
                self.release(Opcode::Realloc, old_ptr, ts);
                self.insert(record.result, record.arg1);
            }
            Opcode::Memalign => {
                self.check_duplicate(Opcode::Memalign, record.result, ts);
                self.insert(record.result, record.arg1);
            }
        }

        self.usage.insert(ts, self.used_bytes);
        self.counts.insert(ts, self.live_count);
    }

    pub fn used_bytes(&self) -> TierVector {
        self.used_bytes
    }

    pub fn live_count(&self) -> TierVector {
        self.live_count
    }

    /// Size of the live block at `address`, if any
    pub fn block_size(&self, address: u32) -> Option<u32> {
        self.live_blocks.get(&address).copied()
    }

    pub fn live_blocks(&self) -> usize {
        self.live_blocks.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn finish(self) -> LedgerOutput {
        LedgerOutput {
            residual_blocks: self.live_blocks.len(),
            histogram: self.histogram,
            usage: self.usage,
            counts: self.counts,
            events: self.events,
            diagnostics: self.diagnostics,
        }
    }

    fn check_duplicate(&mut self, op: Opcode, address: u32, timestamp: u32) {
        if self.live_blocks.contains_key(&address) {
            self.report(Diagnostic::DuplicateBlock { op, address, timestamp });
        }
    }

    /// Drop a live block and its tier contribution, or report it missing
    fn release(&mut self, op: Opcode, address: u32, timestamp: u32) {
        match self.live_blocks.remove(&address) {
            Some(size) => self.retract(size),
            None => self.report(Diagnostic::BlockNotFound { op, address, timestamp }),
        }
    }

    /// Insert or overwrite a block. An overwritten entry's contribution is retracted
    /// first so the tier vectors always match the table.
    fn insert(&mut self, address: u32, size: u32) {
        if let Some(previous) = self.live_blocks.insert(address, size) {
            self.retract(previous);
        }

        let size = size as u64;
        for tier in Tier::covering(size) {
            self.used_bytes[tier.index()] += size;
            self.live_count[tier.index()] += 1;
        }
    }

    fn retract(&mut self, size: u32) {
        let size = size as u64;
        for tier in Tier::covering(size) {
            self.used_bytes[tier.index()] -= size;
            self.live_count[tier.index()] -= 1;
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        warn!("[{}] {}", self.key, diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::size_class::build_bucket_grid;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const KEY: ThreadKey = ThreadKey { pid: 10, thread_id: 0xabc };

    fn ledger() -> Ledger {
        Ledger::new(KEY, build_bucket_grid())
    }

    /// Recompute tier vectors from scratch out of the live table
    fn recompute(ledger: &Ledger) -> (TierVector, TierVector) {
        let mut used = [0; TIER_COUNT];
        let mut count = [0; TIER_COUNT];
        for &size in ledger.live_blocks.values() {
            let size = size as u64;
            for (i, &threshold) in TIER_THRESHOLDS.iter().enumerate() {
                if size < threshold {
                    used[i] += size;
                    count[i] += 1;
                }
            }
        }
        (used, count)
    }

    #[test]
    fn test_tiers_covering_a_size() {
        let covering = |size: u64| Tier::covering(size).collect::<Vec<_>>();

        assert_eq!(covering(0), Tier::ALL.to_vec());
        assert_eq!(covering(63), Tier::ALL.to_vec());
        assert_eq!(covering(64), vec![Tier::Small, Tier::Medium, Tier::Large]);
        assert_eq!(covering(4095), vec![Tier::Small, Tier::Medium, Tier::Large]);
        assert_eq!(covering(4096), vec![Tier::Medium, Tier::Large]);
        assert_eq!(covering(32_768), vec![Tier::Large]);
        assert_eq!(covering(u32::MAX as u64), vec![Tier::Large]);
        assert_eq!(Tier::Small.label(), "[64B, 4KiB)");
    }

    #[test]
    fn test_malloc_then_free() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(0, KEY, 100, 0x1000));
        l.apply(&TraceRecord::free(1, KEY, 0x1000));

        let out = l.finish();
        assert_eq!(
            out.usage,
            TimeSeries::from([(0, [0, 100, 100, 100]), (1, [0, 0, 0, 0])])
        );
        assert_eq!(out.counts, TimeSeries::from([(0, [0, 1, 1, 1]), (1, [0, 0, 0, 0])]));
        assert_eq!(out.histogram[&104], 1);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.residual_blocks, 0);
    }

    #[test]
    fn test_free_unknown_block() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(1, KEY, 10, 0x10));
        l.apply(&TraceRecord::free(2, KEY, 0xdead));

        assert_eq!(
            l.diagnostics(),
            &[Diagnostic::BlockNotFound { op: Opcode::Free, address: 0xdead, timestamp: 2 }]
        );
        assert_eq!(l.used_bytes(), [10, 10, 10, 10]);
        assert_eq!(l.live_count(), [1, 1, 1, 1]);
    }

    #[test]
    fn test_duplicate_malloc_overwrites() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(1, KEY, 5000, 0x10));
        l.apply(&TraceRecord::malloc(2, KEY, 20, 0x10));

        assert_eq!(
            l.diagnostics(),
            &[Diagnostic::DuplicateBlock { op: Opcode::Malloc, address: 0x10, timestamp: 2 }]
        );
        assert_eq!(l.block_size(0x10), Some(20));
        assert_eq!(l.used_bytes(), [20, 20, 20, 20]);
        assert_eq!(l.live_count(), [1, 1, 1, 1]);
    }

    #[test]
    fn test_realloc_in_place() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(1, KEY, 32, 0x10));
        l.apply(&TraceRecord::realloc(2, KEY, 0x10, 8192, 0x10));

        assert!(l.diagnostics().is_empty());
        assert_eq!(l.used_bytes(), [0, 0, 8192, 8192]);
        assert_eq!(l.live_count(), [0, 0, 1, 1]);
    }

    #[test]
    fn test_realloc_moves_block() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(1, KEY, 32, 0x10));
        l.apply(&TraceRecord::realloc(2, KEY, 0x10, 100, 0x20));

        assert_eq!(l.block_size(0x10), None);
        assert_eq!(l.block_size(0x20), Some(100));
        assert_eq!(l.used_bytes(), [0, 100, 100, 100]);
    }

    #[test]
    fn test_realloc_of_unknown_block_still_allocates() {
        let mut l = ledger();
        l.apply(&TraceRecord::realloc(3, KEY, 0x99, 40, 0x20));

        assert_eq!(
            l.diagnostics(),
            &[Diagnostic::BlockNotFound { op: Opcode::Realloc, address: 0x99, timestamp: 3 }]
        );
        assert_eq!(l.block_size(0x20), Some(40));
        assert_eq!(l.live_count(), [1, 1, 1, 1]);
    }

    #[test]
    fn test_realloc_onto_live_block_warns_once() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(1, KEY, 16, 0x10));
        l.apply(&TraceRecord::malloc(1, KEY, 24, 0x20));
        l.apply(&TraceRecord::realloc(2, KEY, 0x10, 48, 0x20));

        assert_eq!(l.diagnostics().len(), 1);
        assert!(matches!(l.diagnostics()[0], Diagnostic::DuplicateBlock { op: Opcode::Realloc, address: 0x20, .. }));
        assert_eq!(l.used_bytes(), [48, 48, 48, 48]);
        assert_eq!(l.live_blocks(), 1);
    }

    #[test]
    fn test_memalign_checks_result_address() {
        let mut l = ledger();
        l.apply(&TraceRecord::memalign(1, KEY, 64, 128, 0x40));
        l.apply(&TraceRecord::memalign(2, KEY, 64, 256, 0x40));

        assert_eq!(
            l.diagnostics(),
            &[Diagnostic::DuplicateBlock { op: Opcode::Memalign, address: 0x40, timestamp: 2 }]
        );
        assert_eq!(l.used_bytes(), [0, 256, 256, 256]);
    }

    #[test]
    fn test_only_malloc_feeds_histogram() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(1, KEY, 100, 0x10));
        l.apply(&TraceRecord::realloc(2, KEY, 0x10, 100, 0x20));
        l.apply(&TraceRecord::memalign(3, KEY, 16, 100, 0x30));

        let out = l.finish();
        assert_eq!(out.histogram.values().sum::<u64>(), 1);
        assert_eq!(out.events, EventCounts { free: 0, malloc: 1, realloc: 1, memalign: 1 });
    }

    #[test]
    fn test_last_event_in_same_millisecond_wins() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(5, KEY, 10, 0x10));
        l.apply(&TraceRecord::malloc(5, KEY, 20, 0x20));

        let out = l.finish();
        assert_eq!(out.usage.len(), 2);
        assert_eq!(out.usage[&5], [30, 30, 30, 30]);
        assert_eq!(out.counts[&5], [2, 2, 2, 2]);
    }

    #[test]
    fn test_event_at_zero_overwrites_baseline() {
        let mut l = ledger();
        l.apply(&TraceRecord::malloc(0, KEY, 70_000, 0x10));

        let out = l.finish();
        assert_eq!(out.usage, TimeSeries::from([(0, [0, 0, 0, 70_000])]));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::BlockNotFound { op: Opcode::Free, address: 0xbeef, timestamp: 12 };
        assert_eq!(d.to_string(), "free@12: block at address beef not found!");

        let d = Diagnostic::DuplicateBlock { op: Opcode::Malloc, address: 0x10, timestamp: 3 };
        assert_eq!(d.to_string(), "malloc@3: block at address 10 already exists!");
    }

    fn op_strategy() -> impl Strategy<Value = (u8, u32, u32, u32)> {
        // (opcode, address slot, second address slot, size)
        (0u8..4, 0u32..8, 0u32..8, 0u32..100_000)
    }

    proptest! {
        #[test]
        fn tier_vectors_match_live_table(ops in proptest::collection::vec(op_strategy(), 1..200)) {
            let mut l = ledger();

            for (t, (op, a, b, size)) in ops.into_iter().enumerate() {
                let t = t as u32;
                let (a, b) = (0x1000 + a * 16, 0x1000 + b * 16);
                let rec = match op {
                    0 => TraceRecord::free(t, KEY, a),
                    1 => TraceRecord::malloc(t, KEY, size, a),
                    2 => TraceRecord::realloc(t, KEY, a, size, b),
                    _ => TraceRecord::memalign(t, KEY, 16, size, a),
                };
                l.apply(&rec);

                let (used, count) = recompute(&l);
                prop_assert_eq!(l.used_bytes(), used);
                prop_assert_eq!(l.live_count(), count);
                prop_assert_eq!(l.usage[&t], used);
                prop_assert_eq!(l.counts[&t], count);
            }
        }
    }
}
