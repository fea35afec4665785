//! Raspberry Pi wiring
//!
//! Opens the GPIO lines of every configured bank and the aux UART through
//! `rppal`, and assembles them into a [`ScanLoop`].

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use rppal::gpio::Gpio;
use rppal::hal::Delay;
use rppal::uart::{Parity, Uart};
use tracing::info;

use crate::aux_frame::{AuxReader, ByteSource};
use crate::config::{AppConfig, AuxConfig, BankConfig};
use crate::layout::{BankLayout, BITS_PER_REGISTER};
use crate::scan_loop::ScanLoop;
use crate::scanner::{BitSource, ShiftRegisterScanner};
use crate::sink::MidiSink;

/// Microseconds to the nanoseconds `DelayNs` takes
fn settle_ns(settle_us: u32) -> u32 {
    settle_us.saturating_mul(1000)
}

/// Acquire the three pins of `bank` and wrap them in a scanner of `len` bits
pub fn open_bank(gpio: &Gpio, bank: &BankConfig, len: usize, settle_us: u32) -> Result<Box<dyn BitSource>> {
    let pin = |bcm: u8, role: &str| {
        gpio.get(bcm)
            .with_context(|| format!("Bank '{}': cannot acquire {} pin BCM {}", bank.name, role, bcm))
    };

    let load = pin(bank.load_pin, "load")?.into_output_high();
    let clock = pin(bank.clock_pin, "clock")?.into_output_low();
    let data = pin(bank.data_pin, "data")?.into_input();

    let scanner = ShiftRegisterScanner::new(load, clock, data, Delay::new(), len, settle_ns(settle_us))
        .with_context(|| format!("Bank '{}': failed to initialise pins", bank.name))?;

    info!(
        "✅ Bank '{}' on BCM load={} clock={} data={} ({} registers)",
        bank.name,
        bank.load_pin,
        bank.clock_pin,
        bank.data_pin,
        len / BITS_PER_REGISTER
    );
    Ok(Box::new(scanner))
}

/// Open every configured bank with its name and layout
pub fn open_banks(config: &AppConfig) -> Result<Vec<(String, Box<dyn BitSource>, BankLayout)>> {
    if config.banks.is_empty() {
        return Ok(Vec::new());
    }

    let gpio = Gpio::new().context("Failed to open GPIO")?;
    let mut banks = Vec::with_capacity(config.banks.len());
    for bank in &config.banks {
        let layout = BankLayout::from_config(&bank.layout)?;
        let scanner = open_bank(&gpio, bank, layout.len(), config.timing.settle_us)?;
        banks.push((bank.name.clone(), scanner, layout));
    }
    Ok(banks)
}

/// UART in non-blocking mode
pub struct SerialPort(Uart);

impl SerialPort {
    pub fn open(aux: &AuxConfig) -> Result<Self> {
        let mut uart = Uart::with_path(&aux.port, aux.baud_rate, Parity::None, 8, 1)
            .with_context(|| format!("Failed to open aux port {}", aux.port))?;
        uart.set_read_mode(0, Duration::ZERO)
            .context("Failed to put aux port in non-blocking mode")?;

        info!("✅ Aux port {} at {} baud", aux.port, aux.baud_rate);
        Ok(Self(uart))
    }
}

impl ByteSource for SerialPort {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Build the scan loop for the configured hardware
pub fn build_scan_loop<S: MidiSink>(config: &AppConfig, sink: S) -> Result<ScanLoop<S>> {
    let mut scan_loop = ScanLoop::new(config.registry()?, sink).with_debounce(config.debounce_scans);

    for (name, scanner, layout) in open_banks(config)? {
        scan_loop
            .add_bank(name.as_str(), scanner, &layout)
            .with_context(|| format!("Failed to add bank '{}'", name))?;
    }

    if let Some(aux) = &config.aux {
        let layout = BankLayout::from_config(&aux.layout)?;
        let shoes = BankLayout::from_config(&aux.shoes)?;
        let port: Box<dyn ByteSource> = Box::new(SerialPort::open(aux)?);
        let reader = AuxReader::new(port, shoes.len(), aux.read_size);

        scan_loop
            .add_aux(aux.name.as_str(), reader, &layout, &shoes)
            .with_context(|| format!("Failed to add aux source '{}'", aux.name))?;
    }

    Ok(scan_loop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_ns() {
        assert_eq!(settle_ns(5), 5_000);
        assert_eq!(settle_ns(u32::MAX), u32::MAX);
    }
}
