use alloc_trace_studio::aggregator::{
    build_bucket_grid, classified_size, process_trace, Diagnostic, ProcessOptions, TimeSeries,
};
use alloc_trace_studio::parser::{Opcode, ThreadKey, TraceRecord};
use pretty_assertions::assert_eq;

fn encode(records: &[TraceRecord]) -> Vec<u8> {
    records.iter().flat_map(|r| r.to_bytes()).collect()
}

#[test]
fn test_malloc_free_round_trip() {
    let key = ThreadKey::new(100, 0x1);
    let buf = encode(&[
        TraceRecord::malloc(0, key, 100, 0x5000),
        TraceRecord::free(1, key, 0x5000),
    ]);

    let analysis = process_trace(&buf, ProcessOptions::default()).unwrap();

    // 100 bytes sits in [64B, 4KiB), so tiers 1..=3 include it
    assert_eq!(
        analysis.usage[&key],
        TimeSeries::from([(0, [0, 100, 100, 100]), (1, [0, 0, 0, 0])])
    );
    assert_eq!(
        analysis.counts[&key],
        TimeSeries::from([(0, [0, 1, 1, 1]), (1, [0, 0, 0, 0])])
    );
}

#[test]
fn test_three_record_scenario() {
    let key = ThreadKey::new(1, 0xabcd);
    let buf = encode(&[
        TraceRecord::malloc(10, key, 50, 0x1000),
        TraceRecord::malloc(20, key, 5000, 0x2000),
        TraceRecord::free(30, key, 0x1000),
    ]);

    let analysis = process_trace(&buf, ProcessOptions::default()).unwrap();

    let hist = &analysis.histograms[&key];
    assert_eq!(hist[&classified_size(50)], 1);
    assert_eq!(hist[&classified_size(5000)], 1);
    assert_eq!(hist.values().sum::<u64>(), 2);
    assert_eq!(hist.len(), build_bucket_grid().len());

    let usage = &analysis.usage[&key];
    assert_eq!(usage.keys().copied().collect::<Vec<_>>(), vec![0, 10, 20, 30]);
    assert_eq!(usage[&0], [0, 0, 0, 0]);
    assert_eq!(usage[&10], [50, 50, 50, 50]);
    assert_eq!(usage[&20], [50, 50, 5050, 5050]);
    assert_eq!(usage[&30], [0, 0, 5000, 5000]);
    assert_eq!(analysis.counts[&key][&30], [0, 0, 1, 1]);
}

#[test]
fn test_processing_is_idempotent() {
    let a = ThreadKey::new(1, 1);
    let b = ThreadKey::new(2, 7);
    let buf = encode(&[
        TraceRecord::malloc(1, a, 33, 0x10),
        TraceRecord::memalign(1, b, 64, 9000, 0x80),
        TraceRecord::realloc(2, a, 0x10, 300, 0x20),
        TraceRecord::free(3, b, 0x80),
        TraceRecord::free(4, a, 0x999),
    ]);

    let first = process_trace(&buf, ProcessOptions::default()).unwrap();
    let second = process_trace(&buf, ProcessOptions::default()).unwrap();
    let parallel = process_trace(&buf, ProcessOptions { parallel: true }).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, parallel);
}

#[test]
fn test_free_of_unknown_block_is_reported_once() {
    let key = ThreadKey::new(3, 3);
    let buf = encode(&[
        TraceRecord::malloc(1, key, 16, 0x10),
        TraceRecord::free(2, key, 0x4242),
    ]);

    let analysis = process_trace(&buf, ProcessOptions::default()).unwrap();

    assert_eq!(
        analysis.diagnostics,
        vec![(
            key,
            Diagnostic::BlockNotFound {
                op: Opcode::Free,
                address: 0x4242,
                timestamp: 2
            }
        )]
    );
    assert_eq!(analysis.usage[&key][&2], analysis.usage[&key][&1]);
    assert_eq!(analysis.counts[&key][&2], [1, 1, 1, 1]);
}

#[test]
fn test_duplicate_malloc_reflects_new_size() {
    let key = ThreadKey::new(3, 4);
    let buf = encode(&[
        TraceRecord::malloc(1, key, 40_000, 0x10),
        TraceRecord::malloc(2, key, 100, 0x10),
    ]);

    let analysis = process_trace(&buf, ProcessOptions::default()).unwrap();

    assert_eq!(analysis.diagnostic_counts(), (0, 1));
    assert_eq!(analysis.usage[&key][&2], [0, 100, 100, 100]);
    assert_eq!(analysis.counts[&key][&2], [0, 1, 1, 1]);
}

#[test]
fn test_interleaved_threads_keep_their_own_order() {
    let a = ThreadKey::new(1, 1);
    let b = ThreadKey::new(1, 2);
    // Not globally sorted by time: b's events carry earlier timestamps
    let buf = encode(&[
        TraceRecord::malloc(50, a, 8, 0x10),
        TraceRecord::malloc(5, b, 8, 0x10),
        TraceRecord::free(60, a, 0x10),
        TraceRecord::free(6, b, 0x10),
    ]);

    let analysis = process_trace(&buf, ProcessOptions::default()).unwrap();

    assert!(analysis.diagnostics.is_empty());
    assert_eq!(analysis.usage[&a].keys().copied().collect::<Vec<_>>(), vec![0, 50, 60]);
    assert_eq!(analysis.usage[&b].keys().copied().collect::<Vec<_>>(), vec![0, 5, 6]);
}

#[test]
fn test_empty_trace_has_no_threads() {
    let analysis = process_trace(&[], ProcessOptions::default()).unwrap();
    assert_eq!(analysis.thread_count(), 0);
    assert_eq!(analysis.record_count, 0);
}
