// Bit-level decoding of 8-byte Timepix3 data records.

use super::lookup::{gray_encode, CalibrationTables};
use super::types::{Coord, Event, Timestamp};

/// Size of one packed data record in bytes.
pub const RECORD_SIZE: usize = 8;

/// High nibble of the first byte of every data record.
pub const DATA_PACKET_TYPE: u8 = 0xB0;

/// True if `byte` starts a data record rather than a non-data packet.
pub fn is_data_packet(byte: u8) -> bool {
    (byte & 0xF0) == DATA_PACKET_TYPE
}

/// Decode one record with the built-in calibration tables.
pub fn decode(record: &[u8; RECORD_SIZE]) -> Event {
    decode_with(record, &CalibrationTables::DEFAULT)
}

/// Decode one record. Never fails: anything malformed yields [`Event::INVALID`].
pub fn decode_with(record: &[u8; RECORD_SIZE], tables: &CalibrationTables<'_>) -> Event {
    let data = record.map(u32::from);

    if !is_data_packet(record[0]) {
        return Event::INVALID;
    }

    let address = ((data[0] & 0x0F) << 12) | (data[1] << 4) | ((data[2] >> 4) & 0x0F);
    let pix = address & 0x07;
    let x = ((address >> 9) & 0x7F) * 2 + pix / 4;
    let y = ((address >> 3) & 0x3F) * 4 + pix % 4;

    let tot_code = ((data[4] & 0x3F) << 4) | ((data[5] >> 4) & 0x0F);
    let Some(&time_over_threshold) = tables.time_over_threshold.get(tot_code as usize) else {
        return Event::INVALID;
    };

    let toa_code = ((data[2] & 0x0F) << 10) | (data[3] << 2) | ((data[4] >> 6) & 0x03);
    let Some(&toa) = tables.time_of_activation.get(toa_code as usize) else {
        return Event::INVALID;
    };
    let coarse = u64::from(toa) + (u64::from(data[6]) << 22) + (u64::from(data[7]) << 14);

    let Some(&shift) = tables.column_shift.get(x as usize) else {
        return Event::INVALID;
    };
    let fast = u64::from(data[5] & 0x0F) + u64::from(shift);

    Event {
        timestamp: (coarse * 16 + fast) as Timestamp,
        x: x as Coord,
        y: y as Coord,
        time_over_threshold,
    }
}

/// Raw field values of a data record, before calibration.
///
/// [`RawEvent::encode`] is the exact inverse of [`decode`] for the built-in
/// tables: `coarse_time` is a 30-bit counter whose low 14 bits travel Gray
/// coded, and `tot_code`/`fast_time` are stored verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub x: Coord,
    pub y: Coord,
    pub coarse_time: u32,
    pub tot_code: u16,
    pub fast_time: u8,
}

impl RawEvent {
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let x = u32::from(self.x);
        let y = u32::from(self.y);
        let pix = (x % 2) * 4 + y % 4;
        let address = ((x / 2) << 9) | ((y / 4) << 3) | pix;

        let toa = gray_encode(self.coarse_time & 0x3FFF);
        let tot = u32::from(self.tot_code) & 0x3FF;
        let fast = u32::from(self.fast_time) & 0x0F;

        [
            DATA_PACKET_TYPE | ((address >> 12) & 0x0F) as u8,
            ((address >> 4) & 0xFF) as u8,
            (((address & 0x0F) << 4) | ((toa >> 10) & 0x0F)) as u8,
            ((toa >> 2) & 0xFF) as u8,
            (((toa & 0x03) << 6) | ((tot >> 4) & 0x3F)) as u8,
            (((tot & 0x0F) << 4) | fast) as u8,
            ((self.coarse_time >> 22) & 0xFF) as u8,
            ((self.coarse_time >> 14) & 0xFF) as u8,
        ]
    }

    /// Timestamp [`decode`] produces for this record.
    pub fn expected_timestamp(&self) -> Timestamp {
        let coarse = i64::from(self.coarse_time & 0x3FFF_FFFF);
        let shift = CalibrationTables::DEFAULT.column_shift[self.x as usize];
        coarse * 16 + i64::from(self.fast_time & 0x0F) + i64::from(shift)
    }
}
