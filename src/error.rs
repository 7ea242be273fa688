//! Unified error handling for the probe-matcher library.
//!
//! Most failure modes in map-matching are local: a malformed row is skipped,
//! a trip without candidates stays unmatched, a degenerate geometry yields
//! zero. This type covers the cases that need to be reported to a caller.

use std::fmt;

/// Unified error type for probe-matcher operations.
#[derive(Debug, Clone)]
pub enum ProbeMatchError {
    /// An input row could not be turned into a link or a probe fix
    InvalidRecord { line: u64, message: String },
    /// A trip names a candidate link that is missing from the link table
    UnknownLink { trip_id: String, link_id: String },
    /// An averaging operation was asked to work on zero points
    EmptyPointSet { context: String },
    /// A coordinate could not be geohash-encoded
    InvalidCoordinate { latitude: f64, longitude: f64 },
    /// Per-fix auxiliary data and matched geometry disagree in length
    RecordLengthMismatch {
        sample_id: String,
        expected: usize,
        found: usize,
    },
    /// File system error
    Io { message: String },
    /// CSV reader/writer error
    Csv { message: String },
    /// Snapshot persistence error
    PersistenceError { message: String },
    /// Configuration error
    ConfigError { message: String },
}

impl fmt::Display for ProbeMatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMatchError::InvalidRecord { line, message } => {
                write!(f, "Invalid record at line {}: {}", line, message)
            }
            ProbeMatchError::UnknownLink { trip_id, link_id } => {
                write!(
                    f,
                    "Trip '{}' references unknown link '{}'",
                    trip_id, link_id
                )
            }
            ProbeMatchError::EmptyPointSet { context } => {
                write!(f, "No points to average for {}", context)
            }
            ProbeMatchError::InvalidCoordinate {
                latitude,
                longitude,
            } => {
                write!(
                    f,
                    "Coordinate ({}, {}) cannot be geohash-encoded",
                    latitude, longitude
                )
            }
            ProbeMatchError::RecordLengthMismatch {
                sample_id,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Trip '{}' has {} fixes but {} auxiliary records",
                    sample_id, expected, found
                )
            }
            ProbeMatchError::Io { message } => write!(f, "I/O error: {}", message),
            ProbeMatchError::Csv { message } => write!(f, "CSV error: {}", message),
            ProbeMatchError::PersistenceError { message } => {
                write!(f, "Persistence error: {}", message)
            }
            ProbeMatchError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for ProbeMatchError {}

impl From<std::io::Error> for ProbeMatchError {
    fn from(err: std::io::Error) -> Self {
        ProbeMatchError::Io {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for ProbeMatchError {
    fn from(err: csv::Error) -> Self {
        ProbeMatchError::Csv {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for ProbeMatchError {
    fn from(err: rusqlite::Error) -> Self {
        ProbeMatchError::PersistenceError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::encode::Error> for ProbeMatchError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ProbeMatchError::PersistenceError {
            message: format!("encode: {}", err),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::decode::Error> for ProbeMatchError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ProbeMatchError::PersistenceError {
            message: format!("decode: {}", err),
        }
    }
}

/// Result type alias for probe-matcher operations.
pub type Result<T> = std::result::Result<T, ProbeMatchError>;

/// Extension trait for converting Option to ProbeMatchError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an unknown-link error.
    fn ok_or_unknown_link(self, trip_id: &str, link_id: &str) -> Result<T>;

    /// Convert Option to Result with an empty-point-set error.
    fn ok_or_empty(self, context: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_link(self, trip_id: &str, link_id: &str) -> Result<T> {
        self.ok_or_else(|| ProbeMatchError::UnknownLink {
            trip_id: trip_id.to_string(),
            link_id: link_id.to_string(),
        })
    }

    fn ok_or_empty(self, context: &str) -> Result<T> {
        self.ok_or_else(|| ProbeMatchError::EmptyPointSet {
            context: context.to_string(),
        })
    }
}
