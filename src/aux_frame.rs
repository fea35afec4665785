//! Aux board frames
//!
//! Some boards (the pedal board's microcontroller) retransmit their whole
//! state as a CSV line of hex fields, `<bits>,<shoe0>,<shoe1>,...\r\n`. Only
//! the most recent complete line matters; anything older is stale.

use tracing::trace;

use crate::error::{Error, FrameError, Result};

/// Bytes kept between polls before giving up on finding a terminator
const MAX_PENDING: usize = 1024;

/// Largest bit vector a frame can carry (one hex `u64`)
pub const MAX_AUX_BITS: usize = 64;

/// One decoded aux record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxFrame {
    /// Bit `i` is the level of position `i`
    pub bits: u64,
    /// Raw controller readings, in field order
    pub readings: Vec<u32>,
}

impl AuxFrame {
    /// The first `len` positions as levels (`true` = high)
    pub fn bit_vector(&self, len: usize) -> Vec<bool> {
        (0..len.min(MAX_AUX_BITS)).map(|i| (self.bits >> i) & 1 == 1).collect()
    }
}

fn malformed(record: &str, reason: impl Into<String>) -> FrameError {
    FrameError::Malformed {
        record: record.to_string(),
        reason: reason.into(),
    }
}

/// Strict hex: digits only, no sign or prefix
fn parse_hex<T>(field: &str, parse: fn(&str, u32) -> Result<T, std::num::ParseIntError>) -> Result<T, String> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not hex", field));
    }
    parse(field, 16).map_err(|e| e.to_string())
}

/// Decode the most recently completed record in `buf`.
///
/// The record ends at the last `\r` and starts after the `\n` preceding it
/// (or at the start of the buffer). Bytes after the last `\r` are an
/// unfinished record and are ignored. The record must have exactly
/// `readings + 1` fields.
pub fn parse_latest(buf: &[u8], readings: usize) -> Result<AuxFrame, FrameError> {
    let end = buf
        .iter()
        .rposition(|&b| b == b'\r')
        .ok_or(FrameError::Incomplete)?;
    let start = buf[..end]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);

    let record = std::str::from_utf8(&buf[start..end])
        .map_err(|_| malformed(&String::from_utf8_lossy(&buf[start..end]), "not valid text"))?;

    let fields: Vec<&str> = record.split(',').map(str::trim).collect();
    if fields.len() != readings + 1 {
        return Err(malformed(
            record,
            format!("expected {} fields, found {}", readings + 1, fields.len()),
        ));
    }

    let bits = parse_hex(fields[0], u64::from_str_radix)
        .map_err(|e| malformed(record, format!("bit field: {}", e)))?;

    let readings = fields[1..]
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            parse_hex(field, u32::from_str_radix)
                .map_err(|e| malformed(record, format!("reading {}: {}", idx, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AuxFrame { bits, readings })
}

/// Non-blocking byte stream (a serial port opened with a zero timeout)
pub trait ByteSource: Send {
    /// Read whatever is available into `buf`, returning 0 when nothing is
    fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read_available(buf)
    }
}

/// Accumulates bytes from a [`ByteSource`] and hands out the newest frame
pub struct AuxReader<S> {
    source: S,
    readings: usize,
    scratch: Vec<u8>,
    pending: Vec<u8>,
    synced: bool,
}

impl<S: ByteSource> AuxReader<S> {
    /// Reader expecting `readings` controller fields per record, reading up
    /// to `read_size` bytes per poll
    pub fn new(source: S, readings: usize, read_size: usize) -> Self {
        Self {
            source,
            readings,
            scratch: vec![0; read_size.max(1)],
            pending: Vec::new(),
            synced: false,
        }
    }

    pub fn readings(&self) -> usize {
        self.readings
    }

    /// Poll the source once.
    ///
    /// `Ok(None)` means no new complete record; a malformed record is
    /// returned as [`Error::FrameParse`] and dropped.
    pub fn poll(&mut self) -> Result<Option<AuxFrame>> {
        let read = self
            .source
            .read_available(&mut self.scratch)
            .map_err(|e| Error::Serial(e.to_string()))?;
        if read == 0 {
            return Ok(None);
        }
        self.pending.extend_from_slice(&self.scratch[..read]);

        // Whatever precedes the first line break may be the tail of a record
        if !self.synced {
            match self.pending.iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    self.pending.drain(..=idx);
                    self.synced = true;
                }
                None => {
                    self.trim_pending();
                    return Ok(None);
                }
            }
        }

        let result = parse_latest(&self.pending, self.readings);

        match result {
            Err(FrameError::Incomplete) => {
                self.trim_pending();
                Ok(None)
            }
            other => {
                if let Some(end) = self.pending.iter().rposition(|&b| b == b'\r') {
                    self.pending.drain(..=end);
                }
                trace!("{} aux bytes carried over", self.pending.len());
                Ok(Some(other?))
            }
        }
    }

    fn trim_pending(&mut self) {
        if self.pending.len() > MAX_PENDING {
            self.pending.clear();
            self.synced = false;
        }
    }
}
