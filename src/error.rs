//! Error taxonomy for the scan-and-translate engine
//!
//! Lookup errors are raised while building layouts at startup and are fatal.
//! Data errors (`OutOfRangeValue`, `FrameParse`) are local to one scan cycle
//! and the scan loop keeps going. Pin and sink failures stop the loop.

use thiserror::Error;

/// Result alias used across the engine
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Division is not part of the configured division list
    #[error("unknown division '{0}'")]
    UnknownDivision(String),

    /// Note name is not one of the 61 supported names (C2..C7)
    #[error("unknown note '{0}'")]
    UnknownNote(String),

    /// A continuous-controller reading does not fit in 8 bits
    #[error("reading {raw} is out of range (expected 0-255)")]
    OutOfRangeValue { raw: u32 },

    /// Aux frame could not be decoded
    #[error("aux frame: {0}")]
    FrameParse(#[from] FrameError),

    /// A bit vector does not have the length of its layout
    #[error("expected {expected} bits, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// GPIO pin access failed
    #[error("pin access failed: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),

    /// Reading the aux serial port failed
    #[error("serial read failed: {0}")]
    Serial(String),

    /// The MIDI sink refused an event
    #[error("MIDI sink: {0}")]
    Sink(String),
}

impl Error {
    /// Whether the scan loop can skip this error and carry on with the next cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfRangeValue { .. } | Error::FrameParse(_))
    }
}

/// Why an aux buffer yielded no frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No record terminator in the buffer yet
    #[error("no complete record available")]
    Incomplete,

    /// A record was found but its contents do not parse
    #[error("malformed record '{record}': {reason}")]
    Malformed { record: String, reason: String },
}

/// Convert an `embedded-hal` pin error into an engine error
pub(crate) fn pin_error<E: embedded_hal::digital::Error>(err: E) -> Error {
    Error::Pin(err.kind())
}
