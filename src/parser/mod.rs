//! Trace decoding and report schema definitions.
//!
//! This module handles:
//! - Decoding raw 24-byte allocator shim records
//! - Validating trace length and opcodes
//! - Defining output schema

pub mod alloc_trace;
pub mod record;
pub mod schema;

// Re-export main types
pub use alloc_trace::{
    decode_record, decode_records, parse_trace, read_trace_file, validate_trace_format, RecordIter,
};
pub use record::{Opcode, ThreadKey, TraceRecord};
pub use schema::{to_report, DiagnosticEntry, DiagnosticReport, Report, ReportOptions, ThreadReport};
