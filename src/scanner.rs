//! 74HC165 shift register chain reader
//!
//! A scan latches every parallel input of the chain with a load pulse, then
//! clocks the bits out one at a time over the serial data line. The first bit
//! is the first register's most significant input, the last is the last
//! register's least significant one.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::{pin_error, Result};

/// Anything that produces a fresh bit vector per call
pub trait BitSource: Send {
    /// Number of positions in every returned vector
    fn width(&self) -> usize;

    /// Read the current state of every position (`true` = line high = contact open)
    fn scan(&mut self) -> Result<Vec<bool>>;
}

/// Reads one bank of daisy-chained registers
pub struct ShiftRegisterScanner<L, C, D, T> {
    load: L,
    clock: C,
    data: D,
    delay: T,
    len: usize,
    settle_ns: u32,
}

impl<L, C, D, T> ShiftRegisterScanner<L, C, D, T>
where
    L: OutputPin,
    C: OutputPin,
    D: InputPin,
    T: DelayNs,
{
    /// Create a scanner clocking `len` bits per scan.
    ///
    /// Puts the control lines in their idle state: load high, clock low.
    pub fn new(mut load: L, mut clock: C, data: D, delay: T, len: usize, settle_ns: u32) -> Result<Self> {
        load.set_high().map_err(pin_error)?;
        clock.set_low().map_err(pin_error)?;

        Ok(Self {
            load,
            clock,
            data,
            delay,
            len,
            settle_ns,
        })
    }

    /// Latch the parallel inputs into the chain
    fn pulse_load(&mut self) -> Result<()> {
        self.load.set_low().map_err(pin_error)?;
        self.delay.delay_ns(self.settle_ns);
        self.load.set_high().map_err(pin_error)?;
        self.delay.delay_ns(self.settle_ns);
        Ok(())
    }

    /// Shift the next bit onto the data line
    fn pulse_clock(&mut self) -> Result<()> {
        self.clock.set_high().map_err(pin_error)?;
        self.delay.delay_ns(self.settle_ns);
        self.clock.set_low().map_err(pin_error)?;
        self.delay.delay_ns(self.settle_ns);
        Ok(())
    }
}

impl<L, C, D, T> BitSource for ShiftRegisterScanner<L, C, D, T>
where
    L: OutputPin + Send,
    C: OutputPin + Send,
    D: InputPin + Send,
    T: DelayNs + Send,
{
    fn width(&self) -> usize {
        self.len
    }

    fn scan(&mut self) -> Result<Vec<bool>> {
        self.pulse_load()?;

        let mut bits = Vec::with_capacity(self.len);
        for _ in 0..self.len {
            bits.push(self.data.is_high().map_err(pin_error)?);
            self.pulse_clock()?;
        }

        Ok(bits)
    }
}
