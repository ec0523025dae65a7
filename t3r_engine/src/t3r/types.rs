// Core value types shared by the decoder, the log reader and the cache.

/// Event timestamp in ticks of 25/16 ns.
pub type Timestamp = i64;

/// Pixel coordinate on the 256x256 detector matrix.
pub type Coord = u8;

/// Calibrated time-over-threshold value.
pub type ShortTimestamp = u16;

/// Width of the detector matrix in pixels (both axes).
pub const DETECTOR_SIZE: usize = 256;

/// A single decoded detector event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Timestamp,
    pub x: Coord,
    pub y: Coord,
    pub time_over_threshold: ShortTimestamp,
}

impl Event {
    /// Sentinel for records that failed to decode or lie past the end of the log.
    pub const INVALID: Event = Event {
        timestamp: Timestamp::MAX,
        x: Coord::MAX,
        y: Coord::MAX,
        time_over_threshold: ShortTimestamp::MAX,
    };

    pub fn is_valid(&self) -> bool {
        self.timestamp != Timestamp::MAX
    }
}

/// Range of event indices within a segment plus the number of valid events in it.
///
/// `start` and `end` are both event indices reached by [`Interval::expand`];
/// `end` is the last index covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
    pub count: u32,
}

impl Interval {
    pub const INVALID: Interval = Interval {
        start: u32::MAX,
        end: 0,
        count: 0,
    };

    pub fn new(start: u32, end: u32, count: u32) -> Self {
        Self { start, end, count }
    }

    /// Note that an interval whose only member is event 0 reports invalid,
    /// since its end is indistinguishable from the empty marker.
    pub fn is_valid(&self) -> bool {
        self.start != u32::MAX && self.end != 0
    }

    /// Union of both index spans with summed counts. The empty marker is the
    /// identity element.
    pub fn merge(&self, other: &Interval) -> Interval {
        Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            count: self.count.saturating_add(other.count),
        }
    }

    /// Grow the interval so it covers `index`, counting one more event.
    pub fn expand(&self, index: u32) -> Interval {
        Interval {
            start: self.start.min(index),
            end: self.end.max(index),
            count: self.count.saturating_add(1),
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::INVALID
    }
}

/// A contiguous timestamp range of the log, bucketed into fixed-width intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub minimum_timestamp: Timestamp,
    pub maximum_timestamp: Timestamp,
    /// Event index the intervals are relative to. Not persisted; always 0 after load.
    pub start_offset: u64,
    pub interval_length: Timestamp,
    pub interval_stride: Timestamp,
    pub event_count: u64,
    pub intervals: Vec<Interval>,
}

impl Segment {
    /// Segment spanning exactly one timestamp, with no intervals yet.
    pub fn singleton(timestamp: Timestamp) -> Self {
        Self {
            minimum_timestamp: timestamp,
            maximum_timestamp: timestamp,
            start_offset: 0,
            interval_length: 0,
            interval_stride: 0,
            event_count: 0,
            intervals: Vec::new(),
        }
    }

    pub fn duration(&self) -> Timestamp {
        self.maximum_timestamp - self.minimum_timestamp
    }

    /// Inclusive containment test, widened by `margin` on both sides.
    pub fn contains(&self, timestamp: Timestamp, margin: Timestamp) -> bool {
        self.minimum_timestamp.saturating_sub(margin) <= timestamp
            && self.maximum_timestamp.saturating_add(margin) >= timestamp
    }
}

/// Event index range returned by a cache lookup. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: u64,
    pub end: u64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn test_event__invalid_sentinel__then_not_valid() {
        assert!(!Event::INVALID.is_valid());
        assert_eq!(Event::INVALID.x, u8::MAX);
        assert_eq!(Event::INVALID.y, u8::MAX);

        let event = Event {
            timestamp: 0,
            x: 1,
            y: 2,
            time_over_threshold: 3,
        };
        assert!(event.is_valid());
    }

    #[test]
    fn test_interval__default__then_invalid() {
        let interval = Interval::default();
        assert_eq!(interval, Interval::INVALID);
        assert!(!interval.is_valid());
    }

    #[test]
    fn test_interval__merge_with_invalid__then_identity() {
        let interval = Interval::new(10, 20, 5);
        assert_eq!(Interval::INVALID.merge(&interval), interval);
        assert_eq!(interval.merge(&Interval::INVALID), interval);
    }

    #[test]
    fn test_interval__merge_two_valid__then_union_and_sum() {
        let a = Interval::new(10, 20, 5);
        let b = Interval::new(15, 40, 7);
        assert_eq!(a.merge(&b), Interval::new(10, 40, 12));
        assert_eq!(b.merge(&a), Interval::new(10, 40, 12));
    }

    #[test]
    fn test_interval__expand_from_invalid__then_covers_index() {
        let interval = Interval::INVALID.expand(7).expand(3).expand(9);
        assert_eq!(interval, Interval::new(3, 9, 3));
        assert!(interval.is_valid());
    }

    #[test]
    fn test_interval__only_index_zero__then_reports_invalid() {
        // Known quirk: end == 0 doubles as the empty marker.
        let interval = Interval::INVALID.expand(0);
        assert_eq!(interval.count, 1);
        assert!(!interval.is_valid());
    }

    #[test]
    fn test_segment__contains_with_margin__then_widened() {
        let mut segment = Segment::singleton(100);
        segment.maximum_timestamp = 200;
        assert!(segment.contains(150, 0));
        assert!(!segment.contains(201, 0));
        assert!(segment.contains(201, 1));
        assert!(segment.contains(95, 5));
        assert!(!segment.contains(94, 5));
        assert_eq!(segment.duration(), 100);
    }
}
