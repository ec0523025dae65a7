use std::fmt;

use thiserror::Error;

/// Which precondition of a bulk read was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    StartIndex,
    EndIndex,
    TargetStartIndex,
    TargetEndIndex,
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RangeBound::StartIndex => "startIndex",
            RangeBound::EndIndex => "endIndex",
            RangeBound::TargetStartIndex => "targetStartIndex",
            RangeBound::TargetEndIndex => "targetEndIndex",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum T3rError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes: expected {expected:?}, got {got:?}")]
    InvalidMagic { expected: Vec<u8>, got: Vec<u8> },

    #[error("Unsupported cache version: {0}")]
    UnsupportedVersion(u32),

    #[error("Truncated cache at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Malformed T3R (unexpected end of file in preamble at offset {offset})")]
    TruncatedPreamble { offset: u64 },

    #[error("{bound} out of bounds: {value} (limit {limit})")]
    OutOfBounds {
        bound: RangeBound,
        value: u64,
        limit: u64,
    },

    #[error("Output column missing: {name}")]
    MissingColumn { name: String },

    #[error("Output column {name} has wrong type (expected {expected})")]
    ColumnType { name: String, expected: &'static str },

    #[error("Unknown stream: {0}")]
    UnknownStream(usize),
}

pub type Result<T> = std::result::Result<T, T3rError>;

impl T3rError {
    /// True for malformed or incompatible files, where rebuilding the cache is
    /// the usual recovery.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            T3rError::InvalidMagic { .. }
                | T3rError::UnsupportedVersion(_)
                | T3rError::Truncated { .. }
                | T3rError::TruncatedPreamble { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn test_error__out_of_bounds__then_names_bound() {
        let err = T3rError::OutOfBounds {
            bound: RangeBound::TargetEndIndex,
            value: 12,
            limit: 10,
        };
        let message = err.to_string();
        assert!(message.contains("targetEndIndex"));
        assert!(message.contains("12"));
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_error__format_family__then_classified() {
        assert!(T3rError::UnsupportedVersion(2).is_format_error());
        assert!(T3rError::TruncatedPreamble { offset: 4 }.is_format_error());
        assert!(T3rError::InvalidMagic {
            expected: b"t3rcache".to_vec(),
            got: b"XXXXXXXX".to_vec(),
        }
        .is_format_error());

        let io = T3rError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_format_error());
        assert!(format!("{io}").contains("gone"));
    }
}
