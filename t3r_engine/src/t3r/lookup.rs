//! Calibration tables used by the event decoder.
//!
//! The built-in tables decode the detector's counter encodings: the 10-bit
//! time-over-threshold counter is a maximal-length LFSR (taps 10 and 7), the
//! 14-bit time-of-activation counter is Gray coded. Hosts with measured
//! calibration data supply their own [`CalibrationTables`].

/// Number of time-over-threshold codes (10 bit).
pub const TIME_OVER_THRESHOLD_CODES: usize = 1 << 10;

/// Number of time-of-activation codes (14 bit).
pub const TIME_OF_ACTIVATION_CODES: usize = 1 << 14;

/// Number of detector columns.
pub const COLUMN_COUNT: usize = 256;

pub static TIME_OVER_THRESHOLD: [u16; TIME_OVER_THRESHOLD_CODES] = time_over_threshold_table();

pub static TIME_OF_ACTIVATION: [u32; TIME_OF_ACTIVATION_CODES] = time_of_activation_table();

pub static COLUMN_SHIFT: [u8; COLUMN_COUNT] = column_shift_table();

const fn time_over_threshold_table() -> [u16; TIME_OVER_THRESHOLD_CODES] {
    let mut table = [0u16; TIME_OVER_THRESHOLD_CODES];
    let mut state: u16 = 0x3FF;
    let mut value: u16 = 0;
    // The all-zero state is never reached and decodes to 0.
    while (value as usize) < TIME_OVER_THRESHOLD_CODES - 1 {
        table[state as usize] = value;
        let feedback = ((state >> 9) ^ (state >> 6)) & 1;
        state = ((state << 1) | feedback) & 0x3FF;
        value += 1;
    }
    table
}

const fn time_of_activation_table() -> [u32; TIME_OF_ACTIVATION_CODES] {
    let mut table = [0u32; TIME_OF_ACTIVATION_CODES];
    let mut value: u32 = 0;
    while (value as usize) < TIME_OF_ACTIVATION_CODES {
        table[gray_encode(value) as usize] = value;
        value += 1;
    }
    table
}

const fn column_shift_table() -> [u8; COLUMN_COUNT] {
    let mut table = [0u8; COLUMN_COUNT];
    let mut column = 0;
    while column < COLUMN_COUNT {
        // Phase offset repeats every 16 double columns.
        table[column] = ((column / 2) % 16) as u8;
        column += 1;
    }
    table
}

pub(crate) const fn gray_encode(value: u32) -> u32 {
    value ^ (value >> 1)
}

/// Lookup tables consulted by [`decode_with`](super::decoder::decode_with).
#[derive(Debug, Clone, Copy)]
pub struct CalibrationTables<'a> {
    pub time_over_threshold: &'a [u16],
    pub time_of_activation: &'a [u32],
    pub column_shift: &'a [u8],
}

impl CalibrationTables<'static> {
    pub const DEFAULT: CalibrationTables<'static> = CalibrationTables {
        time_over_threshold: &TIME_OVER_THRESHOLD,
        time_of_activation: &TIME_OF_ACTIVATION,
        column_shift: &COLUMN_SHIFT,
    };
}

impl Default for CalibrationTables<'static> {
    fn default() -> Self {
        CalibrationTables::DEFAULT
    }
}
