//! Raw bank monitor
//!
//! Wiring check for the shift register banks: prints every bank's bits ten
//! times a second, no MIDI involved. Closed contacts (zeros) are highlighted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;

use crate::layout::BITS_PER_REGISTER;
use crate::scanner::BitSource;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];
const REFRESH: Duration = Duration::from_millis(100);

/// Render bits one register per group, zeros in yellow
pub fn format_bits(bits: &[bool]) -> String {
    bits.chunks(BITS_PER_REGISTER)
        .map(|register| {
            register
                .iter()
                .map(|&bit| {
                    let digit = if bit { "1".normal() } else { "0".yellow().bold() };
                    digit.to_string()
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print the banks until `stop` is set
pub fn run(banks: &mut [(String, Box<dyn BitSource>)], stop: &AtomicBool) -> Result<()> {
    println!("{}", "=== Bank Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let mut tick = 0usize;
    while !stop.load(Ordering::Relaxed) {
        let spinner = SPINNER[tick % SPINNER.len()];
        for (name, bank) in banks.iter_mut() {
            let bits = bank
                .scan()
                .with_context(|| format!("Failed to scan bank '{}'", name))?;
            println!("{} {:<8} {}", spinner, name.bright_white(), format_bits(&bits));
        }
        tick = tick.wrapping_add(1);
        std::thread::sleep(REFRESH);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bits_groups_by_register() {
        colored::control::set_override(false);
        let mut bits = vec![true; 16];
        bits[3] = false;
        assert_eq!(format_bits(&bits), "11101111 11111111");
    }

    #[test]
    fn test_format_bits_partial_group() {
        colored::control::set_override(false);
        assert_eq!(format_bits(&[false, true, false]), "010");
    }
}
