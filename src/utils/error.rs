//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.
//!
//! Per-event inconsistencies in a trace (freeing an unknown block, reusing a live
//! address) are not errors: they are reported as
//! [`Diagnostic`](crate::aggregator::ledger::Diagnostic) values next to the result.

use thiserror::Error;

/// Fatal errors while decoding a trace buffer
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Malformed trace: length {len} is not a multiple of the {record_size}-byte record size")]
    MalformedTrace { len: usize, record_size: usize },

    #[error("Malformed trace: record {index} has unknown opcode {opcode}")]
    UnknownOpcode { index: usize, opcode: u16 },

    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
