// Event streams: a raw log paired with its cache, read by timestamp range.

use super::cache::CacheReader;
use super::error::{Result, T3rError};
use super::reader::{EventLogReader, ReadOptions, ReadResult};
use super::sink::{
    EventSink, COLUMN_TIMESTAMP, COLUMN_TIME_OVER_THRESHOLD, COLUMN_X, COLUMN_Y,
};
use super::types::Timestamp;
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Description of one output column of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    /// "int" or "uint".
    pub data_type: &'static str,
    pub size_bits: u32,
    pub byte_order: &'static str,
}

impl AttributeInfo {
    fn new(name: &'static str, display_name: &'static str, signed: bool, size_bits: u32) -> Self {
        Self {
            name,
            display_name,
            data_type: if signed { "int" } else { "uint" },
            size_bits,
            byte_order: if size_bits > 8 { "little" } else { "none" },
        }
    }
}

/// Columns every stream produces.
pub fn event_attributes() -> Vec<AttributeInfo> {
    vec![
        AttributeInfo::new(COLUMN_X, "X", false, 8),
        AttributeInfo::new(COLUMN_Y, "Y", false, 8),
        AttributeInfo::new(COLUMN_TIMESTAMP, "Time of Activation", true, 64),
        AttributeInfo::new(COLUMN_TIME_OVER_THRESHOLD, "Time over Threshold", false, 16),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub event_count: u64,
    pub minimum_timestamp: Timestamp,
    pub maximum_timestamp: Timestamp,
    pub attributes: Vec<AttributeInfo>,
}

/// A timestamp range read into sink rows
/// `[target_event_offset, target_event_offset + target_event_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReadRequest {
    pub first_timestamp: Timestamp,
    pub last_timestamp: Timestamp,
    pub target_event_offset: u64,
    pub target_event_count: u64,
    pub sorted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReadResult {
    pub result: ReadResult,
    /// Highest timestamp the read is complete up to. Equals the requested
    /// last timestamp unless the read was truncated.
    pub effective_upper_bound: Timestamp,
}

/// One raw log and its loaded cache.
#[derive(Debug)]
pub struct EventStream<B = Mmap> {
    reader: Mutex<EventLogReader<B>>,
    cache: Arc<CacheReader>,
}

impl<B: AsRef<[u8]>> EventStream<B> {
    pub fn new(reader: EventLogReader<B>, cache: Arc<CacheReader>) -> Self {
        Self {
            reader: Mutex::new(reader),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<CacheReader> {
        &self.cache
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            event_count: self.cache.total_event_count(),
            minimum_timestamp: self.cache.minimum_timestamp(),
            maximum_timestamp: self.cache.maximum_timestamp(),
            attributes: event_attributes(),
        }
    }

    /// Read at most `target_event_count` events with timestamps in
    /// `[first_timestamp, last_timestamp]`, using the cache to pick the
    /// record ranges to decode.
    pub fn read_events<S: EventSink + ?Sized>(
        &self,
        sink: &mut S,
        request: &StreamReadRequest,
    ) -> Result<StreamReadResult> {
        let mut last_timestamp = request.last_timestamp;
        let ranges = self.cache.lookup_bounded(
            request.first_timestamp,
            &mut last_timestamp,
            request.target_event_count,
        );

        let candidate_count: u64 = ranges.iter().map(|range| range.count).sum();
        let mut options = ReadOptions {
            start_index: 0,
            end_index: 0,
            min_timestamp: request.first_timestamp,
            max_timestamp: last_timestamp,
            target_start_index: request.target_event_offset,
            target_end_index: request
                .target_event_offset
                .saturating_add(request.target_event_count),
            // Only a sorted read keeps the earliest events when some must be dropped.
            sorted: request.sorted || candidate_count > request.target_event_count,
        };

        let mut output = StreamReadResult {
            result: ReadResult::empty(request.first_timestamp, last_timestamp),
            effective_upper_bound: last_timestamp,
        };

        let mut reader = self.reader.lock();
        let event_count = reader.event_count();
        for range in &ranges {
            options.start_index = range.start;
            options.end_index = range.end.saturating_add(1).min(event_count);
            let sub = reader.read_range(sink, &options)?;

            options.target_start_index += sub.count;
            output.result.count += sub.count;
            output.result.min_timestamp = output.result.min_timestamp.min(sub.min_timestamp);
            output.result.max_timestamp = output.result.max_timestamp.max(sub.max_timestamp);

            if sub.buffer_exceeded {
                output.result.buffer_exceeded = true;
                output.effective_upper_bound = output.result.max_timestamp;
                break;
            }
        }

        Ok(output)
    }
}

/// Ordered set of streams addressed by index.
pub struct EventStreamProvider<B = Mmap> {
    streams: Vec<EventStream<B>>,
}

impl<B: AsRef<[u8]>> Default for EventStreamProvider<B> {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
        }
    }
}

impl<B: AsRef<[u8]>> EventStreamProvider<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream, returning its id.
    pub fn add_stream(&mut self, stream: EventStream<B>) -> usize {
        self.streams.push(stream);
        self.streams.len() - 1
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, stream_id: usize) -> Result<&EventStream<B>> {
        self.streams
            .get(stream_id)
            .ok_or(T3rError::UnknownStream(stream_id))
    }

    pub fn stream_info(&self, stream_id: usize) -> Result<StreamInfo> {
        Ok(self.stream(stream_id)?.info())
    }

    pub fn read_events<S: EventSink + ?Sized>(
        &self,
        stream_id: usize,
        sink: &mut S,
        request: &StreamReadRequest,
    ) -> Result<StreamReadResult> {
        self.stream(stream_id)?.read_events(sink, request)
    }
}
