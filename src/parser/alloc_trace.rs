//! Decoder for raw allocator shim traces.
//!
//! A trace is a flat sequence of fixed 24-byte records with no header or footer.
//! Records come out in file order; nothing here sorts or groups them.

use super::record::{Opcode, TraceRecord};
use crate::utils::config::RECORD_SIZE;
use crate::utils::error::TraceError;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use std::iter::FusedIterator;
use std::path::Path;
use std::slice::ChunksExact;

/// Lazy, restartable iterator over the records of a validated buffer
///
/// **Public** - returned by [`decode_records`]
///
/// Cloning the iterator restarts decoding from the clone's position without
/// touching the buffer.
#[derive(Debug, Clone)]
pub struct RecordIter<'a> {
    chunks: ChunksExact<'a, u8>,
    index: usize,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let index = self.index;
        self.index += 1;
        Some(decode_record(index, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for RecordIter<'_> {}

impl FusedIterator for RecordIter<'_> {}

/// Check that a buffer holds a whole number of records
///
/// **Public** - callers can fail fast before any processing
///
/// # Returns
/// Number of records in the buffer
///
/// # Errors
/// * `TraceError::MalformedTrace` - trailing partial record
pub fn validate_trace_format(buf: &[u8]) -> Result<usize, TraceError> {
    if buf.len() % RECORD_SIZE != 0 {
        return Err(TraceError::MalformedTrace {
            len: buf.len(),
            record_size: RECORD_SIZE,
        });
    }

    Ok(buf.len() / RECORD_SIZE)
}

/// Start decoding a trace buffer
///
/// **Public** - main entry point for streaming decode
///
/// The length check happens here, before any record is produced. Each yielded
/// item can still fail with `TraceError::UnknownOpcode`.
pub fn decode_records(buf: &[u8]) -> Result<RecordIter<'_>, TraceError> {
    let count = validate_trace_format(buf)?;
    debug!("Trace buffer holds {} records ({} bytes)", count, buf.len());

    Ok(RecordIter {
        chunks: buf.chunks_exact(RECORD_SIZE),
        index: 0,
    })
}

/// Decode a whole trace buffer into records, in file order
///
/// **Public** - convenience over [`decode_records`]
///
/// # Errors
/// * `TraceError::MalformedTrace` - length not a multiple of the record size
/// * `TraceError::UnknownOpcode` - a record with an opcode outside 0..=3
pub fn parse_trace(buf: &[u8]) -> Result<Vec<TraceRecord>, TraceError> {
    decode_records(buf)?.collect()
}

/// Decode one 24-byte record
///
/// **Public** - `index` is only used for error reporting
pub fn decode_record(index: usize, chunk: &[u8]) -> Result<TraceRecord, TraceError> {
    if chunk.len() != RECORD_SIZE {
        return Err(TraceError::MalformedTrace {
            len: chunk.len(),
            record_size: RECORD_SIZE,
        });
    }

    let raw_opcode = LittleEndian::read_u16(&chunk[4..6]);
    let opcode = Opcode::try_from(raw_opcode).map_err(|opcode| TraceError::UnknownOpcode {
        index,
        opcode,
    })?;

    Ok(TraceRecord {
        time_ms: LittleEndian::read_u32(&chunk[0..4]),
        opcode,
        pid: LittleEndian::read_u16(&chunk[6..8]),
        thread_id: LittleEndian::read_u32(&chunk[8..12]),
        result: LittleEndian::read_u32(&chunk[12..16]),
        arg0: LittleEndian::read_u32(&chunk[16..20]),
        arg1: LittleEndian::read_u32(&chunk[20..24]),
    })
}

/// Read a trace file from disk in one bulk read
///
/// **Public** - the driver's only I/O on the input side
pub fn read_trace_file(path: impl AsRef<Path>) -> Result<Vec<u8>, TraceError> {
    let path = path.as_ref();
    debug!("Reading trace file: {}", path.display());

    let buf = std::fs::read(path)?;
    validate_trace_format(&buf)?;

    Ok(buf)
}
