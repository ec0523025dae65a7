// Timepix3 raw event logs: decoding, time-indexed caching and ranged reads.

pub mod cache;
pub mod decoder;
pub mod error;
pub mod loader;
pub mod lookup;
pub mod reader;
pub mod sink;
pub mod stream;
pub mod types;

// Re-export main types
pub use cache::{BuildStats, CacheBuilder, CacheConfig, CacheIndex, CacheReader};
pub use decoder::{decode, decode_with, RawEvent, RECORD_SIZE};
pub use error::{RangeBound, Result, T3rError};
pub use loader::{cache_path_for, open_stream};
pub use lookup::CalibrationTables;
pub use reader::{EventLogReader, ReadOptions, ReadResult, ResyncStrategy};
pub use sink::{BufferGroup, EventColumns, EventSink};
pub use stream::{
    AttributeInfo, EventStream, EventStreamProvider, StreamInfo, StreamReadRequest,
    StreamReadResult,
};
pub use types::{Event, IndexRange, Interval, Segment, Timestamp};
