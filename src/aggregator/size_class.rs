//! Fragmentation-bounded size classes for the allocation histogram.
//!
//! Small requests keep 8-byte resolution. Larger ones get coarser classes, chosen so
//! that rounding a request up to its class wastes less than 1/32 of it. That gives
//! 16 classes per power of two above 256 bytes, the same shape as a buddy-style
//! allocator size-class table.

use crate::utils::config::{GRID_GRANULARITY_LIMIT, MAX_FRAGMENTATION, MIN_SIZE_CLASS};
use std::collections::BTreeMap;

/// Histogram of malloc requests: classified size -> number of requests
pub type SizeHistogram = BTreeMap<u64, u64>;

/// Granularity for a request of `size` bytes
///
/// **Public** - the class of a request is `size` rounded up to a multiple of this
///
/// Starts at 8 and doubles while the waste `1 - ((n - s) + 1) / n` of the 8-aligned
/// request `n` stays below 1/32. The returned value is always a power of two >= 8.
pub fn classify(size: u64) -> u64 {
    let n = round_up(size.max(MIN_SIZE_CLASS), MIN_SIZE_CLASS);
    let mut granularity = MIN_SIZE_CLASS;

    while fragmentation(n, granularity) < MAX_FRAGMENTATION {
        granularity *= 2;
    }

    granularity
}

/// Histogram key for a request of `size` bytes
///
/// Requests below 8 bytes are counted as 8.
pub fn classified_size(size: u64) -> u64 {
    round_up(size.max(MIN_SIZE_CLASS), classify(size))
}

/// All admissible class boundaries, ascending
///
/// **Public** - deterministic, independent of any trace
///
/// # Algorithm
/// Walk `i` from 8 in steps of the current granularity `s`. Before recording `i`,
/// double `s` while the waste at `i` is under 1/32 and `i` stays aligned to the
/// doubled granularity. Stops once `s` reaches 2^28, which places the last
/// boundary at 2^32 and so covers every 32-bit request.
pub fn bucket_boundaries() -> Vec<u64> {
    let mut boundaries = Vec::new();
    let mut i = MIN_SIZE_CLASS;
    let mut granularity = MIN_SIZE_CLASS;

    while granularity < GRID_GRANULARITY_LIMIT {
        while fragmentation(i, granularity) < MAX_FRAGMENTATION {
            if i & (granularity * 2 - 1) != 0 {
                break;
            }
            granularity *= 2;
        }

        boundaries.push(i);
        i += granularity;
    }

    boundaries
}

/// Zero-filled histogram skeleton with one entry per class boundary
///
/// **Public** - cloned for every thread so empty classes still show up as 0
pub fn build_bucket_grid() -> SizeHistogram {
    bucket_boundaries().into_iter().map(|b| (b, 0)).collect()
}

/// Fraction of an `n`-byte block lost when rounding to granularity `s`
fn fragmentation(n: u64, s: u64) -> f64 {
    1.0 - ((n as f64 - s as f64) + 1.0) / n as f64
}

fn round_up(n: u64, granularity: u64) -> u64 {
    (n + (granularity - 1)) & !(granularity - 1)
}
