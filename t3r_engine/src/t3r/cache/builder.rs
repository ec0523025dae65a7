// One-shot construction of the segment/interval index from a raw log.

use super::format::CacheIndex;
use super::CacheConfig;
use crate::t3r::reader::EventLogReader;
use crate::t3r::types::{Interval, Segment, Timestamp};
use tracing::{debug, info};

/// Diagnostic counters collected while populating intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Records scanned.
    pub scanned_count: u64,
    /// Records that failed to decode.
    pub invalid_count: u64,
    /// Valid events outside every resolved segment.
    pub outlier_count: u64,
    /// Valid events inside a segment but past its last interval.
    pub out_of_bounds_count: u64,
}

impl BuildStats {
    fn percentage(&self, count: u64) -> f64 {
        if self.scanned_count == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.scanned_count as f64
        }
    }
}

/// Builds a [`CacheIndex`] in five phases: segment discovery, merge,
/// interval sizing, population and count finalisation. The log is scanned
/// twice.
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn build<B: AsRef<[u8]>>(&self, reader: &mut EventLogReader<B>) -> (CacheIndex, BuildStats) {
        let segments = discover_segments(reader, self.config.segment_margin);
        let mut segments = merge_segments(segments);
        size_intervals(
            &mut segments,
            reader.event_count(),
            self.config.target_interval_size,
        );
        let stats = populate_segments(&mut segments, reader);
        finalize_counts(&mut segments);

        info!(
            segments = segments.len(),
            invalid = stats.invalid_count,
            invalid_percent = stats.percentage(stats.invalid_count),
            outliers = stats.outlier_count,
            outlier_percent = stats.percentage(stats.outlier_count),
            "Event cache built"
        );

        (CacheIndex::new(segments), stats)
    }
}

fn find_segment(segments: &[Segment], timestamp: Timestamp, margin: Timestamp) -> Option<usize> {
    segments
        .iter()
        .position(|segment| segment.contains(timestamp, margin))
}

fn discover_segments<B: AsRef<[u8]>>(reader: &mut EventLogReader<B>, margin: Timestamp) -> Vec<Segment> {
    debug!("Initializing segments...");

    let mut segments: Vec<Segment> = Vec::new();
    for (_, entry) in reader.entries() {
        if !entry.is_valid() {
            continue;
        }
        match find_segment(&segments, entry.timestamp, margin) {
            Some(i) => {
                let segment = &mut segments[i];
                segment.minimum_timestamp = segment.minimum_timestamp.min(entry.timestamp);
                segment.maximum_timestamp = segment.maximum_timestamp.max(entry.timestamp);
            }
            None => segments.push(Segment::singleton(entry.timestamp)),
        }
    }
    segments
}

/// Drop single-timestamp segments, sort, and coalesce overlaps.
///
/// An overlapping successor is absorbed by clipping the running segment's
/// maximum to the successor's minimum, not by widening it.
fn merge_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    debug!("Merging segments...");

    segments.retain(|segment| segment.minimum_timestamp != segment.maximum_timestamp);
    segments.sort_by_key(|segment| (segment.minimum_timestamp, segment.maximum_timestamp));

    let mut remaining = segments.into_iter();
    let Some(mut current) = remaining.next() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    for next in remaining {
        if current.maximum_timestamp >= next.minimum_timestamp {
            current.maximum_timestamp = next.minimum_timestamp;
        } else {
            merged.push(std::mem::replace(&mut current, next));
        }
    }
    merged.push(current);

    debug!(count = merged.len(), "segments found");
    merged
}

/// Spread `event_count / target_interval_size` intervals over the segments in
/// proportion to their duration, plus one spare interval per segment.
fn size_intervals(segments: &mut [Segment], event_count: u64, target_interval_size: u64) {
    debug!("Resizing segments...");

    let total_interval_count = i128::from((event_count / target_interval_size.max(1)).max(1));
    let duration_sum: i128 = segments
        .iter()
        .map(|segment| i128::from(segment.duration()))
        .sum();

    for segment in segments.iter_mut() {
        let duration = segment.duration();
        let interval_count = if duration_sum > 0 {
            (i128::from(duration) * total_interval_count / duration_sum).max(1)
        } else {
            1
        };
        let interval_count = i64::try_from(interval_count).unwrap_or(i64::MAX);

        segment.interval_length = (duration / interval_count).max(1);
        // TODO: support stride > length, letting one event land in several overlapping intervals.
        segment.interval_stride = segment.interval_length;
        segment.intervals = vec![Interval::INVALID; interval_count as usize + 1];
    }
}

fn populate_segments<B: AsRef<[u8]>>(
    segments: &mut [Segment],
    reader: &mut EventLogReader<B>,
) -> BuildStats {
    debug!("Populating segments...");

    let mut stats = BuildStats::default();
    for (index, entry) in reader.entries() {
        stats.scanned_count += 1;
        if !entry.is_valid() {
            stats.invalid_count += 1;
            continue;
        }

        let Some(i) = find_segment(segments, entry.timestamp, 0) else {
            stats.outlier_count += 1;
            continue;
        };

        let segment = &mut segments[i];
        let interval_index = (entry.timestamp - segment.minimum_timestamp) / segment.interval_length;
        let slot = usize::try_from(interval_index)
            .ok()
            .filter(|&slot| slot < segment.intervals.len());

        match (slot, u32::try_from(index)) {
            (Some(slot), Ok(index)) => {
                let interval = &mut segment.intervals[slot];
                *interval = interval.expand(index);
            }
            _ => {
                stats.out_of_bounds_count += 1;
                debug!(
                    timestamp = entry.timestamp,
                    index,
                    minimum = segment.minimum_timestamp,
                    maximum = segment.maximum_timestamp,
                    interval_length = segment.interval_length,
                    intervals = segment.intervals.len(),
                    "Entry out of interval bounds"
                );
            }
        }
    }
    stats
}

fn finalize_counts(segments: &mut [Segment]) {
    for segment in segments.iter_mut() {
        segment.event_count = segment
            .intervals
            .iter()
            .map(|interval| u64::from(interval.count))
            .sum();
    }
}
