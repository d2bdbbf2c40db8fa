//! Configuration and constants for the trace analyzer.

/// Size of one trace record on disk, in bytes
pub const RECORD_SIZE: usize = 24;

/// Current report schema version
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

// Tier thresholds for live-block accounting.
// A block counts towards every tier whose threshold is strictly greater than its size,
// so each tier is cumulative over all the smaller ones. The last tier covers every u32 size.
pub const TIER_COUNT: usize = 4;
pub const TIER_THRESHOLDS: [u64; TIER_COUNT] = [1 << 6, 1 << 12, 1 << 15, 1 << 32];
pub const TIER_LABELS: [&str; TIER_COUNT] = ["< 64B", "[64B, 4KiB)", "[4KiB, 32KiB)", ">= 32KiB"];

// Size classification
pub const MIN_SIZE_CLASS: u64 = 8;
pub const MAX_FRAGMENTATION: f64 = 1.0 / 32.0;
pub const GRID_GRANULARITY_LIMIT: u64 = 1 << 28;

/// Keep every n-th sample when thinning time series for display
pub const DEFAULT_DOWNSAMPLE_STEP: usize = 10;
