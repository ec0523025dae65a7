// On-disk layout of the segment/interval index (little-endian):
//
//   magic "t3rcache" | version u32 | segment count u32 | segment*
//   segment = min i64 | max i64 | length i64 | stride i64 | event count u64
//             | interval count u64 | {start u32, end u32, count u32}*

use crate::t3r::error::{Result, T3rError};
use crate::t3r::types::{Interval, Segment};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const MAGIC: &[u8; 8] = b"t3rcache";
pub const VERSION: u32 = 3;

const INTERVAL_SIZE: usize = 12;

/// Ordered, non-overlapping segments making up one cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheIndex {
    pub segments: Vec<Segment>,
}

impl CacheIndex {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(self.segments.len() as u32).to_le_bytes())?;

        for segment in &self.segments {
            writer.write_all(&segment.minimum_timestamp.to_le_bytes())?;
            writer.write_all(&segment.maximum_timestamp.to_le_bytes())?;
            writer.write_all(&segment.interval_length.to_le_bytes())?;
            writer.write_all(&segment.interval_stride.to_le_bytes())?;
            writer.write_all(&segment.event_count.to_le_bytes())?;
            writer.write_all(&(segment.intervals.len() as u64).to_le_bytes())?;
            for interval in &segment.intervals {
                writer.write_all(&interval.start.to_le_bytes())?;
                writer.write_all(&interval.end.to_le_bytes())?;
                writer.write_all(&interval.count.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Create (or truncate) `path` and write the index to it.
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut bytes);
        bytes
    }

    /// Parse a complete cache file. Segment start offsets are reset to 0.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);

        let magic = cursor.take(MAGIC.len())?;
        if magic != MAGIC {
            return Err(T3rError::InvalidMagic {
                expected: MAGIC.to_vec(),
                got: magic.to_vec(),
            });
        }

        let version = cursor.read_u32()?;
        if version != VERSION {
            return Err(T3rError::UnsupportedVersion(version));
        }

        let segment_count = cursor.read_u32()? as usize;
        let mut segments = Vec::with_capacity(segment_count.min(cursor.remaining() / 48));
        for _ in 0..segment_count {
            segments.push(cursor.read_segment()?);
        }

        Ok(Self { segments })
    }
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        if self.remaining() < needed {
            return Err(T3rError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_segment(&mut self) -> Result<Segment> {
        let minimum_timestamp = self.read_i64()?;
        let maximum_timestamp = self.read_i64()?;
        let interval_length = self.read_i64()?;
        let interval_stride = self.read_i64()?;
        let event_count = self.read_u64()?;
        let interval_count = self.read_u64()?;

        // Reject counts the remaining bytes cannot hold before allocating.
        let needed = usize::try_from(interval_count)
            .ok()
            .and_then(|count| count.checked_mul(INTERVAL_SIZE))
            .unwrap_or(usize::MAX);
        if needed > self.remaining() {
            return Err(T3rError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }

        let mut intervals = Vec::with_capacity(interval_count as usize);
        for _ in 0..interval_count {
            let start = self.read_u32()?;
            let end = self.read_u32()?;
            let count = self.read_u32()?;
            intervals.push(Interval::new(start, end, count));
        }

        Ok(Segment {
            minimum_timestamp,
            maximum_timestamp,
            start_offset: 0,
            interval_length,
            interval_stride,
            event_count,
            intervals,
        })
    }
}
