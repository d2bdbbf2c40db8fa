//! Typed view of a single allocator shim trace record.
//!
//! Layout on disk (24 bytes, little-endian):
//!
//! ```text
//! 0   u32 time_ms
//! 4   u16 opcode      0=free 1=malloc 2=realloc 3=memalign
//! 6   u16 pid
//! 8   u32 thread_id
//! 12  u32 result      returned address (0 for free)
//! 16  u32 arg0        free: ptr | malloc: size | realloc: old ptr | memalign: alignment
//! 20  u32 arg1        realloc/memalign: size
//! ```

use crate::utils::config::RECORD_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Allocation operation recorded by the shim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Free = 0,
    Malloc = 1,
    Realloc = 2,
    Memalign = 3,
}

impl Opcode {
    /// Lowercase operation name as it appears in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Free => "free",
            Opcode::Malloc => "malloc",
            Opcode::Realloc => "realloc",
            Opcode::Memalign => "memalign",
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Opcode::Free),
            1 => Ok(Opcode::Malloc),
            2 => Ok(Opcode::Realloc),
            3 => Ok(Opcode::Memalign),
            other => Err(other),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of the thread that produced an event.
///
/// Ordered by pid first, then thread id. Rendered as `"<pid>:<thread id in hex>"`,
/// e.g. `"1234:b7d4f6c0"`, which is also its JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadKey {
    pub pid: u16,
    pub thread_id: u32,
}

impl ThreadKey {
    pub fn new(pid: u16, thread_id: u32) -> Self {
        Self { pid, thread_id }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:08x}", self.pid, self.thread_id)
    }
}

impl FromStr for ThreadKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pid, thread_id) = s
            .split_once(':')
            .ok_or_else(|| format!("Thread key '{}' is missing ':' separator", s))?;

        let pid = pid
            .parse::<u16>()
            .map_err(|e| format!("Invalid pid in thread key '{}': {}", s, e))?;
        let thread_id = u32::from_str_radix(thread_id, 16)
            .map_err(|e| format!("Invalid thread id in thread key '{}': {}", s, e))?;

        Ok(Self { pid, thread_id })
    }
}

impl Serialize for ThreadKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ThreadKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One decoded trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub time_ms: u32,
    pub opcode: Opcode,
    pub pid: u16,
    pub thread_id: u32,
    pub result: u32,
    pub arg0: u32,
    pub arg1: u32,
}

impl TraceRecord {
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey::new(self.pid, self.thread_id)
    }

    /// Pointer passed to `free`
    pub fn free_ptr(&self) -> u32 {
        self.arg0
    }

    /// Pointer passed to `realloc`
    pub fn realloc_old_ptr(&self) -> u32 {
        self.arg0
    }

    /// Alignment passed to `memalign`
    pub fn alignment(&self) -> u32 {
        self.arg0
    }

    /// Size the caller asked for, `None` for `free`
    pub fn requested_size(&self) -> Option<u32> {
        match self.opcode {
            Opcode::Free => None,
            Opcode::Malloc => Some(self.arg0),
            Opcode::Realloc | Opcode::Memalign => Some(self.arg1),
        }
    }

    /// Encode back into the on-disk layout
    ///
    /// **Public** - used to build synthetic traces
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.time_ms);
        LittleEndian::write_u16(&mut buf[4..6], self.opcode as u16);
        LittleEndian::write_u16(&mut buf[6..8], self.pid);
        LittleEndian::write_u32(&mut buf[8..12], self.thread_id);
        LittleEndian::write_u32(&mut buf[12..16], self.result);
        LittleEndian::write_u32(&mut buf[16..20], self.arg0);
        LittleEndian::write_u32(&mut buf[20..24], self.arg1);
        buf
    }

    // Shorthand constructors for building traces in code

    pub fn free(time_ms: u32, key: ThreadKey, ptr: u32) -> Self {
        Self::with_args(time_ms, Opcode::Free, key, 0, ptr, 0)
    }

    pub fn malloc(time_ms: u32, key: ThreadKey, size: u32, result: u32) -> Self {
        Self::with_args(time_ms, Opcode::Malloc, key, result, size, 0)
    }

    pub fn realloc(time_ms: u32, key: ThreadKey, old_ptr: u32, size: u32, result: u32) -> Self {
        Self::with_args(time_ms, Opcode::Realloc, key, result, old_ptr, size)
    }

    pub fn memalign(time_ms: u32, key: ThreadKey, align: u32, size: u32, result: u32) -> Self {
        Self::with_args(time_ms, Opcode::Memalign, key, result, align, size)
    }

    fn with_args(
        time_ms: u32,
        opcode: Opcode,
        key: ThreadKey,
        result: u32,
        arg0: u32,
        arg1: u32,
    ) -> Self {
        Self {
            time_ms,
            opcode,
            pid: key.pid,
            thread_id: key.thread_id,
            result,
            arg0,
            arg1,
        }
    }
}
