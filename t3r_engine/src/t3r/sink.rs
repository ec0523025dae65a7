// Named-column output buffers that bulk reads write decoded events into.

use super::error::{Result, T3rError};
use super::types::{Coord, Event, ShortTimestamp, Timestamp};

pub const COLUMN_X: &str = "x";
pub const COLUMN_Y: &str = "y";
pub const COLUMN_TIMESTAMP: &str = "timestamp";
pub const COLUMN_TIME_OVER_THRESHOLD: &str = "timeOverThreshold";

/// Mutable views of the four event columns of a sink.
pub struct EventColumns<'a> {
    pub x: &'a mut [Coord],
    pub y: &'a mut [Coord],
    pub timestamp: &'a mut [Timestamp],
    pub time_over_threshold: &'a mut [ShortTimestamp],
}

impl EventColumns<'_> {
    pub fn write(&mut self, row: usize, event: &Event) {
        self.x[row] = event.x;
        self.y[row] = event.y;
        self.timestamp[row] = event.timestamp;
        self.time_over_threshold[row] = event.time_over_threshold;
    }
}

/// Fixed-capacity destination for decoded events.
///
/// Every column returned by [`EventSink::event_columns`] must hold at least
/// [`EventSink::capacity`] rows.
pub trait EventSink {
    fn capacity(&self) -> u64;

    fn event_columns(&mut self) -> Result<EventColumns<'_>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I64(Vec<i64>),
}

impl Column {
    fn type_name(&self) -> &'static str {
        match self {
            Column::U8(_) => "u8",
            Column::U16(_) => "u16",
            Column::I64(_) => "i64",
        }
    }
}

/// Element types a [`Column`] can hold.
pub trait ColumnValue: Copy + Default + Sized {
    const TYPE_NAME: &'static str;

    fn column(capacity: usize) -> Column;
    fn slice(column: &Column) -> Option<&[Self]>;
    fn slice_mut(column: &mut Column) -> Option<&mut [Self]>;
}

macro_rules! column_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl ColumnValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn column(capacity: usize) -> Column {
                Column::$variant(vec![<$ty>::default(); capacity])
            }

            fn slice(column: &Column) -> Option<&[Self]> {
                match column {
                    Column::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn slice_mut(column: &mut Column) -> Option<&mut [Self]> {
                match column {
                    Column::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

column_value!(u8, U8, "u8");
column_value!(u16, U16, "u16");
column_value!(i64, I64, "i64");

/// In-memory sink made of named, typed columns of equal length.
#[derive(Debug, Clone)]
pub struct BufferGroup {
    capacity: usize,
    columns: Vec<(String, Column)>,
}

impl BufferGroup {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            columns: Vec::new(),
        }
    }

    /// Buffer group with the `x`, `y`, `timestamp` and `timeOverThreshold` columns.
    pub fn for_events(capacity: usize) -> Self {
        let mut group = Self::new(capacity);
        group.add_column::<Coord>(COLUMN_X);
        group.add_column::<Coord>(COLUMN_Y);
        group.add_column::<Timestamp>(COLUMN_TIMESTAMP);
        group.add_column::<ShortTimestamp>(COLUMN_TIME_OVER_THRESHOLD);
        group
    }

    /// Add (or replace) a zero-filled column.
    pub fn add_column<T: ColumnValue>(&mut self, name: &str) {
        let column = T::column(self.capacity);
        match self.columns.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = column,
            None => self.columns.push((name.to_string(), column)),
        }
    }

    pub fn column<T: ColumnValue>(&self, name: &str) -> Option<&[T]> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == name)
            .and_then(|(_, column)| T::slice(column))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Decoded event stored at `row`.
    pub fn event(&self, row: usize) -> Option<Event> {
        Some(Event {
            x: *self.column::<Coord>(COLUMN_X)?.get(row)?,
            y: *self.column::<Coord>(COLUMN_Y)?.get(row)?,
            timestamp: *self.column::<Timestamp>(COLUMN_TIMESTAMP)?.get(row)?,
            time_over_threshold: *self
                .column::<ShortTimestamp>(COLUMN_TIME_OVER_THRESHOLD)?
                .get(row)?,
        })
    }
}

fn bind<'a, T: ColumnValue>(
    slot: &mut Option<&'a mut [T]>,
    name: &str,
    column: &'a mut Column,
) -> Result<()> {
    let type_name = column.type_name();
    match T::slice_mut(column) {
        Some(values) => {
            *slot = Some(values);
            Ok(())
        }
        None => Err(T3rError::ColumnType {
            name: format!("{name} ({type_name})"),
            expected: T::TYPE_NAME,
        }),
    }
}

fn required<'a, T>(slot: Option<&'a mut [T]>, name: &str) -> Result<&'a mut [T]> {
    slot.ok_or_else(|| T3rError::MissingColumn {
        name: name.to_string(),
    })
}

impl EventSink for BufferGroup {
    fn capacity(&self) -> u64 {
        self.capacity as u64
    }

    fn event_columns(&mut self) -> Result<EventColumns<'_>> {
        let mut x = None;
        let mut y = None;
        let mut timestamp = None;
        let mut time_over_threshold = None;

        for (name, column) in self.columns.iter_mut() {
            match name.as_str() {
                COLUMN_X => bind(&mut x, name, column)?,
                COLUMN_Y => bind(&mut y, name, column)?,
                COLUMN_TIMESTAMP => bind(&mut timestamp, name, column)?,
                COLUMN_TIME_OVER_THRESHOLD => bind(&mut time_over_threshold, name, column)?,
                _ => {}
            }
        }

        Ok(EventColumns {
            x: required(x, COLUMN_X)?,
            y: required(y, COLUMN_Y)?,
            timestamp: required(timestamp, COLUMN_TIMESTAMP)?,
            time_over_threshold: required(time_over_threshold, COLUMN_TIME_OVER_THRESHOLD)?,
        })
    }
}
