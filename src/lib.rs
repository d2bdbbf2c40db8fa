//! Alloc Trace Studio
//!
//! Reconstructs per-thread heap behaviour from binary allocator shim traces.
//!
//! Every trace record is one `free`, `malloc`, `realloc` or `memalign` call. The
//! library replays them per `(pid, thread)` and produces, for each thread:
//! - a size-class histogram of malloc requests
//! - bytes in use over time, per cumulative size tier
//! - live block count over time, per cumulative size tier
//!
//! ## Getting Started
//!
//! ```ignore
//! use alloc_trace_studio::aggregator::{process_trace, ProcessOptions};
//!
//! let buf = std::fs::read("app.trace")?;
//! let analysis = process_trace(&buf, ProcessOptions::default())?;
//! for key in analysis.thread_keys() {
//!     println!("{}: {} samples", key, analysis.usage[key].len());
//! }
//! ```
//!
//! The `alloc-trace` CLI wraps this and writes a JSON report.

pub mod aggregator;
pub mod commands;
pub mod output;
pub mod parser;
pub mod utils;
