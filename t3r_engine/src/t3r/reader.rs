// Sequential and random access over a raw T3R event log.

use super::decoder::{decode_with, is_data_packet, RECORD_SIZE};
use super::error::{RangeBound, Result, T3rError};
use super::lookup::CalibrationTables;
use super::sink::EventSink;
use super::types::{Event, Timestamp};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::warn;

/// Size of one non-data packet in the preamble.
pub const PACKET_SIZE: usize = 4;

/// What to do after a record fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResyncStrategy {
    /// Step back half a record so the next read starts 4 bytes after the
    /// failed one, recovering from a stream shifted by one packet.
    #[default]
    RewindHalfRecord,
    /// Keep the 8-byte record grid.
    None,
}

/// Parameters of [`EventLogReader::read_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// First event index to scan.
    pub start_index: u64,
    /// Event index to stop before.
    pub end_index: u64,
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    /// First sink row to write.
    pub target_start_index: u64,
    /// Sink row to stop before.
    pub target_end_index: u64,
    /// Sort by timestamp and keep the earliest events when the sink range is too small.
    pub sorted: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            start_index: 0,
            end_index: 0,
            min_timestamp: Timestamp::MIN,
            max_timestamp: Timestamp::MAX,
            target_start_index: 0,
            target_end_index: 0,
            sorted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Rows written to the sink.
    pub count: u64,
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    /// True if matching events had to be left out for lack of sink rows.
    pub buffer_exceeded: bool,
}

impl ReadResult {
    /// Empty result. Its bounds are reversed (`min = max_timestamp`,
    /// `max = min_timestamp`) so merging with real results is a no-op.
    pub fn empty(min_timestamp: Timestamp, max_timestamp: Timestamp) -> Self {
        Self {
            count: 0,
            min_timestamp: max_timestamp,
            max_timestamp: min_timestamp,
            buffer_exceeded: false,
        }
    }
}

/// Reader over a raw event log: a preamble of 4-byte non-data packets
/// followed by 8-byte data records.
///
/// Holds a single cursor; concurrent users need their own reader.
#[derive(Debug)]
pub struct EventLogReader<B = Mmap> {
    data: B,
    start_offset: u64,
    event_count: u64,
    position: usize,
    tables: CalibrationTables<'static>,
    resync: ResyncStrategy,
}

impl EventLogReader<Mmap> {
    /// Open and memory-map a raw log file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(mmap)
    }
}

impl<B: AsRef<[u8]>> EventLogReader<B> {
    pub fn from_bytes(data: B) -> Result<Self> {
        let mut reader = EventLogReader {
            data,
            start_offset: 0,
            event_count: 0,
            position: 0,
            tables: CalibrationTables::DEFAULT,
            resync: ResyncStrategy::default(),
        };
        reader.read_header()?;
        Ok(reader)
    }

    pub fn with_resync(mut self, resync: ResyncStrategy) -> Self {
        self.resync = resync;
        self
    }

    pub fn with_tables(mut self, tables: CalibrationTables<'static>) -> Self {
        self.tables = tables;
        self
    }

    /// Skip the preamble and count the records behind it.
    fn read_header(&mut self) -> Result<()> {
        let bytes = self.data.as_ref();
        let mut offset = 0usize;

        while let Some(&first) = bytes.get(offset) {
            if is_data_packet(first) {
                break;
            }
            if bytes.len() - offset < PACKET_SIZE {
                return Err(T3rError::TruncatedPreamble {
                    offset: offset as u64,
                });
            }
            offset += PACKET_SIZE;
        }

        self.start_offset = offset as u64;
        self.event_count = ((bytes.len() - offset) / RECORD_SIZE) as u64;
        self.position = offset;
        Ok(())
    }

    /// Byte offset of the first data record.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Number of records after the preamble, valid or not.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn seek(&mut self, event_index: u64) {
        let offset = self
            .start_offset
            .saturating_add(event_index.saturating_mul(RECORD_SIZE as u64));
        self.position = usize::try_from(offset).unwrap_or(usize::MAX);
    }

    pub fn end_reached(&self) -> bool {
        let consumed = (self.position as u64).saturating_sub(self.start_offset);
        consumed / RECORD_SIZE as u64 >= self.event_count
    }

    /// Decode the record under the cursor and advance past it.
    ///
    /// A short tail yields [`Event::INVALID`]. A record that fails to decode
    /// also yields it, after applying the configured [`ResyncStrategy`].
    pub fn read_entry(&mut self) -> Event {
        let bytes = self.data.as_ref();
        let record = bytes
            .get(self.position..)
            .and_then(|rest| rest.get(..RECORD_SIZE))
            .and_then(|slice| <&[u8; RECORD_SIZE]>::try_from(slice).ok());

        let Some(record) = record else {
            warn!(position = self.position, "Unexpected end of file");
            self.position = self.position.max(bytes.len());
            return Event::INVALID;
        };

        let entry = decode_with(record, &self.tables);
        self.position += RECORD_SIZE;
        if !entry.is_valid() && self.resync == ResyncStrategy::RewindHalfRecord {
            self.position -= PACKET_SIZE;
        }
        entry
    }

    /// Iterate `(index, event)` over the whole log from the first record.
    pub fn entries(&mut self) -> EntryIter<'_, B> {
        self.seek(0);
        let end = self.event_count;
        EntryIter {
            reader: self,
            index: 0,
            end,
        }
    }

    /// Decode `[start_index, end_index)` into sink rows
    /// `[target_start_index, target_end_index)`, keeping only valid events
    /// with timestamps in `[min_timestamp, max_timestamp]`.
    pub fn read_range<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        options: &ReadOptions,
    ) -> Result<ReadResult> {
        let mut result = ReadResult::empty(options.min_timestamp, options.max_timestamp);

        if options.start_index >= options.end_index
            || options.target_start_index >= options.target_end_index
        {
            return Ok(result);
        }

        let capacity = sink.capacity();
        let checks = [
            (RangeBound::StartIndex, options.start_index, self.event_count, false),
            (RangeBound::EndIndex, options.end_index, self.event_count, true),
            (RangeBound::TargetStartIndex, options.target_start_index, capacity, false),
            (RangeBound::TargetEndIndex, options.target_end_index, capacity, true),
        ];
        for (bound, value, limit, inclusive) in checks {
            if value > limit || (!inclusive && value == limit) {
                return Err(T3rError::OutOfBounds { bound, value, limit });
            }
        }

        let mut columns = sink.event_columns()?;
        let in_range = |entry: &Event| {
            entry.is_valid()
                && entry.timestamp >= options.min_timestamp
                && entry.timestamp <= options.max_timestamp
        };

        self.seek(options.start_index);
        let target_start = options.target_start_index as usize;
        let target_end = options.target_end_index as usize;
        let mut offset = target_start;

        if options.sorted {
            let limit = target_end - target_start;
            let mut entries = Vec::with_capacity(limit);
            for _ in options.start_index..options.end_index {
                let entry = self.read_entry();
                if in_range(&entry) {
                    entries.push(entry);
                }
            }

            entries.sort_by_key(|entry| entry.timestamp);
            if entries.len() > limit {
                result.buffer_exceeded = true;
                entries.truncate(limit);
            }

            if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
                result.min_timestamp = first.timestamp;
                result.max_timestamp = last.timestamp;
            }

            for entry in &entries {
                columns.write(offset, entry);
                offset += 1;
            }
        } else {
            for _ in options.start_index..options.end_index {
                if offset >= target_end {
                    result.buffer_exceeded = true;
                    break;
                }
                let entry = self.read_entry();
                if in_range(&entry) {
                    columns.write(offset, &entry);
                    offset += 1;
                    result.min_timestamp = result.min_timestamp.min(entry.timestamp);
                    result.max_timestamp = result.max_timestamp.max(entry.timestamp);
                }
            }
        }

        result.count = (offset - target_start) as u64;
        Ok(result)
    }
}

/// Sequential scan produced by [`EventLogReader::entries`].
pub struct EntryIter<'a, B> {
    reader: &'a mut EventLogReader<B>,
    index: u64,
    end: u64,
}

impl<B: AsRef<[u8]>> Iterator for EntryIter<'_, B> {
    type Item = (u64, Event);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some((index, self.reader.read_entry()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.index) as usize;
        (remaining, Some(remaining))
    }
}

impl<B: AsRef<[u8]>> ExactSizeIterator for EntryIter<'_, B> {}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::t3r::decoder::RawEvent;
    use crate::t3r::sink::{BufferGroup, COLUMN_TIMESTAMP};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(coarse_time: u32) -> [u8; 8] {
        RawEvent {
            x: 0,
            y: 0,
            coarse_time,
            tot_code: 1,
            fast_time: 0,
        }
        .encode()
    }

    fn log_bytes(preamble_packets: usize, coarse_times: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..preamble_packets {
            bytes.extend_from_slice(&[0x71, 0x00, 0x00, 0x00]);
        }
        for &coarse_time in coarse_times {
            bytes.extend_from_slice(&record(coarse_time));
        }
        bytes
    }

    fn timestamps(group: &BufferGroup, count: u64) -> Vec<i64> {
        group.column::<i64>(COLUMN_TIMESTAMP).unwrap()[..count as usize].to_vec()
    }

    #[test]
    fn test_reader__preamble_then_records__then_offset_and_count() {
        let reader = EventLogReader::from_bytes(log_bytes(1, &[10, 20, 30])).unwrap();
        assert_eq!(reader.start_offset(), 4);
        assert_eq!(reader.event_count(), 3);
    }

    #[test]
    fn test_reader__no_preamble__then_zero_offset() {
        let reader = EventLogReader::from_bytes(log_bytes(0, &[1, 2])).unwrap();
        assert_eq!(reader.start_offset(), 0);
        assert_eq!(reader.event_count(), 2);
    }

    #[test]
    fn test_reader__truncated_preamble__then_error() {
        let result = EventLogReader::from_bytes(vec![0x71u8, 0x00]);
        assert!(matches!(result, Err(T3rError::TruncatedPreamble { offset: 0 })));

        let result = EventLogReader::from_bytes(vec![0x71u8, 0, 0, 0, 0x50, 0, 0]);
        assert!(matches!(result, Err(T3rError::TruncatedPreamble { offset: 4 })));
    }

    #[test]
    fn test_reader__empty_file__then_no_events() {
        let reader = EventLogReader::from_bytes(Vec::<u8>::new()).unwrap();
        assert_eq!(reader.event_count(), 0);
        assert!(reader.end_reached());
    }

    #[test]
    fn test_reader__open_path__then_memory_mapped() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&log_bytes(2, &[5, 6, 7, 8])).unwrap();
        file.flush().unwrap();

        let mut reader = EventLogReader::open(file.path()).unwrap();
        assert_eq!(reader.start_offset(), 8);
        assert_eq!(reader.event_count(), 4);
        reader.seek(3);
        assert_eq!(reader.read_entry().timestamp, 8 * 16);
        assert!(reader.end_reached());
    }

    #[test]
    fn test_reader__seek_and_read__then_random_access() {
        let mut reader = EventLogReader::from_bytes(log_bytes(1, &[10, 20, 30])).unwrap();
        reader.seek(2);
        assert_eq!(reader.read_entry().timestamp, 30 * 16);
        reader.seek(0);
        assert_eq!(reader.read_entry().timestamp, 10 * 16);
    }

    #[test]
    fn test_reader__short_tail__then_invalid() {
        let mut bytes = log_bytes(0, &[10]);
        bytes.extend_from_slice(&record(20)[..5]);
        let mut reader = EventLogReader::from_bytes(bytes).unwrap();
        assert_eq!(reader.event_count(), 1);
        reader.seek(1);
        assert_eq!(reader.read_entry(), Event::INVALID);
    }

    #[test]
    fn test_reader__corrupt_record__then_rewinds_half_record() {
        // A stray 4-byte packet between records shifts the grid by half a record.
        let mut bytes = log_bytes(0, &[10]);
        bytes.extend_from_slice(&[0x71, 0, 0, 0]);
        bytes.extend_from_slice(&record(20));
        bytes.extend_from_slice(&record(30));
        let mut reader = EventLogReader::from_bytes(bytes.clone()).unwrap();

        assert_eq!(reader.read_entry().timestamp, 10 * 16);
        assert_eq!(reader.read_entry(), Event::INVALID);
        assert_eq!(reader.read_entry().timestamp, 20 * 16);
        assert_eq!(reader.read_entry().timestamp, 30 * 16);

        let mut reader = EventLogReader::from_bytes(bytes)
            .unwrap()
            .with_resync(ResyncStrategy::None);
        assert_eq!(reader.read_entry().timestamp, 10 * 16);
        assert_eq!(reader.read_entry(), Event::INVALID);
        assert_eq!(reader.read_entry(), Event::INVALID);
    }

    #[test]
    fn test_reader__entries__then_yields_every_index() {
        let mut reader = EventLogReader::from_bytes(log_bytes(1, &[3, 2, 1])).unwrap();
        let entries: Vec<_> = reader.entries().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], (0, reader_event(3)));
        assert_eq!(entries[2].0, 2);
        assert_eq!(entries[2].1.timestamp, 16);
    }

    fn reader_event(coarse_time: u32) -> Event {
        crate::t3r::decoder::decode(&record(coarse_time))
    }

    #[test]
    fn test_read_range__unsorted__then_filters_by_timestamp() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[1, 2, 3, 4, 5])).unwrap();
        let mut group = BufferGroup::for_events(10);
        let options = ReadOptions {
            start_index: 0,
            end_index: 5,
            min_timestamp: 2 * 16,
            max_timestamp: 4 * 16,
            target_start_index: 0,
            target_end_index: 10,
            sorted: false,
        };

        let result = reader.read_range(&mut group, &options).unwrap();
        assert_eq!(result.count, 3);
        assert_eq!(result.min_timestamp, 32);
        assert_eq!(result.max_timestamp, 64);
        assert!(!result.buffer_exceeded);
        assert_eq!(timestamps(&group, 3), vec![32, 48, 64]);
    }

    #[test]
    fn test_read_range__unsorted_sink_full__then_buffer_exceeded() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[5, 4, 3, 2, 1])).unwrap();
        let mut group = BufferGroup::for_events(4);
        let options = ReadOptions {
            start_index: 0,
            end_index: 5,
            target_start_index: 1,
            target_end_index: 3,
            ..ReadOptions::default()
        };

        let result = reader.read_range(&mut group, &options).unwrap();
        assert_eq!(result.count, 2);
        assert!(result.buffer_exceeded);
        assert_eq!(
            group.column::<i64>(COLUMN_TIMESTAMP).unwrap(),
            &[0, 5 * 16, 4 * 16, 0]
        );
        assert_eq!(result.min_timestamp, 64);
        assert_eq!(result.max_timestamp, 80);
    }

    #[test]
    fn test_read_range__sorted__then_keeps_earliest() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[5, 4, 3, 2, 1])).unwrap();
        let mut group = BufferGroup::for_events(3);
        let options = ReadOptions {
            start_index: 0,
            end_index: 5,
            target_start_index: 0,
            target_end_index: 3,
            sorted: true,
            ..ReadOptions::default()
        };

        let result = reader.read_range(&mut group, &options).unwrap();
        assert_eq!(result.count, 3);
        assert!(result.buffer_exceeded);
        assert_eq!(timestamps(&group, 3), vec![16, 32, 48]);
        assert_eq!(result.min_timestamp, 16);
        assert_eq!(result.max_timestamp, 48);
    }

    #[test]
    fn test_read_range__sorted_fits__then_not_exceeded() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[3, 1, 2])).unwrap();
        let mut group = BufferGroup::for_events(3);
        let options = ReadOptions {
            start_index: 0,
            end_index: 3,
            target_end_index: 3,
            sorted: true,
            ..ReadOptions::default()
        };

        let result = reader.read_range(&mut group, &options).unwrap();
        assert_eq!(result.count, 3);
        assert!(!result.buffer_exceeded);
        assert_eq!(timestamps(&group, 3), vec![16, 32, 48]);
    }

    #[test]
    fn test_read_range__nothing_matches__then_reverse_bounds() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[1, 2])).unwrap();
        let mut group = BufferGroup::for_events(2);
        for sorted in [false, true] {
            let options = ReadOptions {
                start_index: 0,
                end_index: 2,
                min_timestamp: 1000,
                max_timestamp: 2000,
                target_end_index: 2,
                sorted,
                ..ReadOptions::default()
            };
            let result = reader.read_range(&mut group, &options).unwrap();
            assert_eq!(result, ReadResult::empty(1000, 2000));
            assert_eq!(result.min_timestamp, 2000);
            assert_eq!(result.max_timestamp, 1000);
        }
    }

    #[test]
    fn test_read_range__bounds_violations__then_distinct_errors() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[1, 2, 3])).unwrap();
        let mut group = BufferGroup::for_events(4);
        let base = ReadOptions {
            start_index: 0,
            end_index: 3,
            target_start_index: 0,
            target_end_index: 4,
            ..ReadOptions::default()
        };

        let cases = [
            (ReadOptions { start_index: 3, end_index: 4, ..base }, RangeBound::StartIndex),
            (ReadOptions { end_index: 4, ..base }, RangeBound::EndIndex),
            (
                ReadOptions { target_start_index: 4, target_end_index: 5, ..base },
                RangeBound::TargetStartIndex,
            ),
            (ReadOptions { target_end_index: 5, ..base }, RangeBound::TargetEndIndex),
        ];

        for (options, expected) in cases {
            let err = reader.read_range(&mut group, &options).unwrap_err();
            assert!(
                matches!(err, T3rError::OutOfBounds { bound, .. } if bound == expected),
                "unexpected error: {err:?}"
            );
        }
        assert!(group.column::<i64>(COLUMN_TIMESTAMP).unwrap().iter().all(|ts| *ts == 0));
    }

    #[test]
    fn test_read_range__empty_request__then_empty_result() {
        let mut reader = EventLogReader::from_bytes(log_bytes(0, &[1])).unwrap();
        let mut group = BufferGroup::for_events(1);
        let options = ReadOptions {
            start_index: 5,
            end_index: 5,
            target_end_index: 1,
            ..ReadOptions::default()
        };
        let result = reader.read_range(&mut group, &options).unwrap();
        assert_eq!(result.count, 0);
    }
}
