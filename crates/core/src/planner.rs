//! Chunk planner: splits an object into ordered, fixed-size parts.

use serde::{Deserialize, Serialize};

/// Default part size (5 MiB), the smallest part S3-compatible stores accept
/// for every part but the last.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// One contiguous byte range of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDescriptor {
    /// 1-based sequence number.
    pub part_number: u32,
    /// Offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

impl PartDescriptor {
    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Number of parts needed to cover `len` bytes.
pub fn part_count(len: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

/// Partition `[0, len)` into parts of `chunk_size` bytes (last one may be shorter).
///
/// A zero length or zero chunk size yields an empty plan; both are rejected
/// earlier by object and config validation.
pub fn plan_parts(len: u64, chunk_size: u64) -> Vec<PartDescriptor> {
    let count = part_count(len, chunk_size);
    (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            PartDescriptor {
                part_number: (i + 1) as u32,
                offset,
                len: chunk_size.min(len - offset),
            }
        })
        .collect()
}
