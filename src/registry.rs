//! Note and division lookup tables
//!
//! A division is an address space of notes (pedal, great, ...) and maps to one
//! MIDI channel: its position in the configured division list. Notes come from
//! a fixed chromatic table running from C2 to C7.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// MIDI note number of the lowest supported name (C2)
pub const LOWEST_MIDI_NOTE: u8 = 36;

/// Maximum number of divisions (one per MIDI channel)
pub const MAX_DIVISIONS: usize = 16;

/// Supported note names in ascending pitch order
pub const NOTE_NAMES: [&str; 61] = [
    "C2", "Db2", "D2", "Eb2", "E2", "F2", "Gb2", "G2", "Ab2", "A2", "Bb2", "B2",
    "C3", "Db3", "D3", "Eb3", "E3", "F3", "Gb3", "G3", "Ab3", "A3", "Bb3", "B3",
    "C4", "Db4", "D4", "Eb4", "E4", "F4", "Gb4", "G4", "Ab4", "A4", "Bb4", "B4",
    "C5", "Db5", "D5", "Eb5", "E5", "F5", "Gb5", "G5", "Ab5", "A5", "Bb5", "B5",
    "C6", "Db6", "D6", "Eb6", "E6", "F6", "Gb6", "G6", "Ab6", "A6", "Bb6", "B6",
    "C7",
];

/// A note from the supported range, stored as its index in [`NOTE_NAMES`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note(u8);

impl Note {
    /// Look up a note by name (case-sensitive, flats only: "Db4", not "C#4")
    pub fn from_name(name: &str) -> Result<Self> {
        NOTE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| Note(idx as u8))
            .ok_or_else(|| Error::UnknownNote(name.to_string()))
    }

    /// Note at a given position in the table
    pub fn from_index(index: usize) -> Option<Self> {
        (index < NOTE_NAMES.len()).then_some(Note(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.index()]
    }

    /// MIDI note number (36-96)
    pub fn midi_number(self) -> u8 {
        self.0 + LOWEST_MIDI_NOTE
    }

    /// Chromatic run from `from` to `to`, both inclusive.
    ///
    /// Descends when `from` is above `to`, which is how some boards are wired.
    pub fn run(from: Note, to: Note) -> Vec<Note> {
        if from <= to {
            (from.0..=to.0).map(Note).collect()
        } else {
            (to.0..=from.0).rev().map(Note).collect()
        }
    }
}

impl FromStr for Note {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Note::from_name(s)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Division and note registry
#[derive(Debug, Clone)]
pub struct NoteRegistry {
    divisions: Vec<String>,
}

impl NoteRegistry {
    /// Build a registry from the ordered division list
    pub fn new<I, S>(divisions: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let divisions: Vec<String> = divisions.into_iter().map(Into::into).collect();

        if divisions.is_empty() {
            anyhow::bail!("At least one division must be configured");
        }
        if divisions.len() > MAX_DIVISIONS {
            anyhow::bail!(
                "{} divisions configured, but only {} MIDI channels exist",
                divisions.len(),
                MAX_DIVISIONS
            );
        }
        for (idx, name) in divisions.iter().enumerate() {
            if name.is_empty() {
                anyhow::bail!("Division {} name cannot be empty", idx);
            }
            if divisions[..idx].contains(name) {
                anyhow::bail!("Division '{}' is listed twice", name);
            }
        }

        Ok(Self { divisions })
    }

    /// MIDI channel (0-15) of a division
    pub fn channel_of(&self, division: &str) -> Result<u8> {
        self.divisions
            .iter()
            .position(|d| d == division)
            .map(|idx| idx as u8)
            .ok_or_else(|| Error::UnknownDivision(division.to_string()))
    }

    /// MIDI note number of a note name
    pub fn midi_note_of(&self, note: &str) -> Result<u8> {
        Note::from_name(note).map(Note::midi_number)
    }

    pub fn divisions(&self) -> &[String] {
        &self.divisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn organ() -> NoteRegistry {
        NoteRegistry::new(["pedal", "accomp", "great", "solo"]).unwrap()
    }

    #[test]
    fn test_channel_is_division_ordinal() {
        let registry = organ();
        assert_eq!(registry.channel_of("pedal"), Ok(0));
        assert_eq!(registry.channel_of("great"), Ok(2));
        assert_eq!(registry.channel_of("solo"), Ok(3));
    }

    #[test]
    fn test_unknown_division() {
        assert_eq!(
            organ().channel_of("swell"),
            Err(Error::UnknownDivision("swell".to_string()))
        );
    }

    #[test]
    fn test_note_range_endpoints() {
        let registry = organ();
        assert_eq!(registry.midi_note_of("C2"), Ok(36));
        assert_eq!(registry.midi_note_of("C4"), Ok(60));
        assert_eq!(registry.midi_note_of("C7"), Ok(96));
    }

    #[test]
    fn test_note_numbers_strictly_increasing() {
        let registry = organ();
        let numbers: Vec<u8> = NOTE_NAMES
            .iter()
            .map(|n| registry.midi_note_of(n).unwrap())
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] + 1 == w[1]));
        assert_eq!(numbers.len(), 61);
    }

    #[test]
    fn test_unknown_note() {
        // Sharps are not part of the table
        assert_eq!(
            organ().midi_note_of("C#4"),
            Err(Error::UnknownNote("C#4".to_string()))
        );
        assert!(organ().midi_note_of("C8").is_err());
    }

    #[test]
    fn test_run_ascending_and_descending() {
        let c2: Note = "C2".parse().unwrap();
        let eb2: Note = "Eb2".parse().unwrap();

        let up: Vec<&str> = Note::run(c2, eb2).into_iter().map(Note::name).collect();
        assert_eq!(up, ["C2", "Db2", "D2", "Eb2"]);

        let down: Vec<&str> = Note::run(eb2, c2).into_iter().map(Note::name).collect();
        assert_eq!(down, ["Eb2", "D2", "Db2", "C2"]);
    }

    #[test]
    fn test_registry_rejects_bad_division_lists() {
        assert!(NoteRegistry::new(Vec::<String>::new()).is_err());
        assert!(NoteRegistry::new(["pedal", "pedal"]).is_err());
        assert!(NoteRegistry::new((0..17).map(|i| format!("d{}", i))).is_err());
    }
}
