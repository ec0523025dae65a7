// Read-only view of a cache file answering timestamp range lookups.

use super::format::CacheIndex;
use crate::t3r::error::Result;
use crate::t3r::types::{IndexRange, Interval, Segment, Timestamp};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Rounding applied when mapping a timestamp to an interval index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    /// Round down: the interval the timestamp falls into.
    Minimum,
    /// Round up relative to the end of the first interval, so the range
    /// covers every interval that may hold a matching event.
    Maximum,
}

/// Loaded cache. Immutable after construction and safe to share between threads.
#[derive(Debug, Clone, Default)]
pub struct CacheReader {
    segments: Vec<Segment>,
}

impl CacheReader {
    /// Memory-map and parse a cache file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&mmap)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_index(CacheIndex::parse(bytes)?))
    }

    pub fn from_index(index: CacheIndex) -> Self {
        Self {
            segments: index.segments,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of indexed (valid, non-outlier) events.
    pub fn total_event_count(&self) -> u64 {
        self.segments.iter().map(|segment| segment.event_count).sum()
    }

    pub fn minimum_timestamp(&self) -> Timestamp {
        self.segments
            .first()
            .map_or(0, |segment| segment.minimum_timestamp)
    }

    pub fn maximum_timestamp(&self) -> Timestamp {
        self.segments
            .last()
            .map_or(0, |segment| segment.maximum_timestamp)
    }

    pub fn find_segment_containing(&self, timestamp: Timestamp) -> Option<usize> {
        self.segments
            .iter()
            .position(|segment| segment.contains(timestamp, 0))
    }

    /// Interval index of `timestamp` within `segment`, clamped to the
    /// segment's intervals. `segment` must have at least one interval.
    pub fn find_interval_bound(segment: &Segment, timestamp: Timestamp, kind: BoundKind) -> usize {
        let stride = segment.interval_stride.max(1);
        let last = segment.intervals.len().saturating_sub(1);

        let index = match kind {
            BoundKind::Minimum => {
                let relative = timestamp.saturating_sub(segment.minimum_timestamp).max(0);
                relative / stride
            }
            BoundKind::Maximum => {
                let relative = timestamp
                    .saturating_sub(segment.minimum_timestamp)
                    .saturating_sub(segment.interval_length)
                    .max(0);
                relative / stride + i64::from(relative % stride != 0)
            }
        };

        usize::try_from(index).map_or(last, |index| index.min(last))
    }

    /// Event index ranges covering `[min_timestamp, max_timestamp]`, without a size limit.
    pub fn lookup_unbounded(&self, min_timestamp: Timestamp, max_timestamp: Timestamp) -> Vec<IndexRange> {
        let mut max_timestamp = max_timestamp;
        self.lookup_bounded(min_timestamp, &mut max_timestamp, u64::MAX)
    }

    /// Event index ranges covering `[min_timestamp, max_timestamp]`, one per
    /// segment touched.
    ///
    /// If taking a further interval would push the total count past
    /// `max_entry_count`, the scan stops at the previous interval and
    /// `max_timestamp` is lowered to that interval's end. The first and last
    /// interval of a segment's range, and the first interval taken in a
    /// segment, are always accepted.
    pub fn lookup_bounded(
        &self,
        min_timestamp: Timestamp,
        max_timestamp: &mut Timestamp,
        max_entry_count: u64,
    ) -> Vec<IndexRange> {
        let mut ranges = Vec::new();
        if self.segments.is_empty() {
            return ranges;
        }

        let min_segment = self.find_segment_containing(min_timestamp).unwrap_or(0);
        let max_segment = self
            .find_segment_containing(*max_timestamp)
            .unwrap_or(self.segments.len() - 1);

        let mut total_count = 0u64;
        let mut size_limit_reached = false;

        for segment in self
            .segments
            .iter()
            .take(max_segment + 1)
            .skip(min_segment)
        {
            if size_limit_reached {
                break;
            }
            if segment.intervals.is_empty() {
                continue;
            }

            let min_index = Self::find_interval_bound(segment, min_timestamp, BoundKind::Minimum);
            let max_index = Self::find_interval_bound(segment, *max_timestamp, BoundKind::Maximum);

            let mut merged = Interval::INVALID;
            for i in min_index..=max_index {
                let candidate = merged.merge(&segment.intervals[i]);
                let exceeds = total_count.saturating_add(u64::from(candidate.count)) > max_entry_count;
                if exceeds && merged.is_valid() && i > min_index && i < max_index {
                    *max_timestamp = segment.minimum_timestamp
                        + segment.interval_stride * (i as i64 - 1)
                        + segment.interval_length;
                    size_limit_reached = true;
                    break;
                }
                merged = candidate;
            }

            if merged.is_valid() {
                total_count += u64::from(merged.count);
                ranges.push(IndexRange {
                    start: segment.start_offset + u64::from(merged.start),
                    end: segment.start_offset + u64::from(merged.end),
                    count: u64::from(merged.count),
                });
            }
        }

        ranges
    }
}
