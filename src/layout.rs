//! Position tables
//!
//! A layout lists, in scan order, what each clocked bit (or aux reading) is
//! wired to. Unbound slots keep physical addressing stable on boards that are
//! only partially populated.

use std::collections::HashSet;

use crate::config::SlotConfig;
use crate::error::Result;
use crate::registry::Note;

/// Bits contributed by one 74HC165
pub const BITS_PER_REGISTER: usize = 8;

/// What a single scan position is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionSlot {
    /// A key contact playing `note` in `division`
    Key { division: String, note: Note },
    /// A continuous controller (swell shoe) sending volume on `channel`
    Shoe { name: String, channel: u8 },
    /// Nothing connected
    Unbound,
}

impl PositionSlot {
    pub fn key(division: impl Into<String>, note: &str) -> Result<Self> {
        Ok(PositionSlot::Key {
            division: division.into(),
            note: Note::from_name(note)?,
        })
    }

    pub fn shoe(name: impl Into<String>, channel: u8) -> Self {
        PositionSlot::Shoe {
            name: name.into(),
            channel,
        }
    }
}

/// Ordered position table of one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankLayout {
    slots: Vec<PositionSlot>,
}

impl BankLayout {
    pub fn new(slots: Vec<PositionSlot>) -> Self {
        Self { slots }
    }

    /// Expand compact config entries (runs, unbound gaps) into slots
    pub fn from_config(entries: &[SlotConfig]) -> Result<Self> {
        let mut slots = Vec::new();
        for entry in entries {
            match entry {
                SlotConfig::Run { division, from, to } => {
                    let from = Note::from_name(from)?;
                    let to = Note::from_name(to)?;
                    slots.extend(Note::run(from, to).into_iter().map(|note| PositionSlot::Key {
                        division: division.clone(),
                        note,
                    }));
                }
                SlotConfig::Key { division, note } => {
                    slots.push(PositionSlot::key(division.clone(), note)?);
                }
                SlotConfig::Unbound { unbound } => {
                    slots.extend(std::iter::repeat(PositionSlot::Unbound).take(*unbound));
                }
                SlotConfig::Shoe { shoe, channel } => {
                    slots.push(PositionSlot::shoe(shoe.clone(), *channel));
                }
            }
        }
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PositionSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[PositionSlot] {
        &self.slots
    }

    /// Number of 74HC165 registers needed to clock this layout, if it fills them exactly
    pub fn register_count(&self) -> Option<usize> {
        (!self.slots.is_empty() && self.slots.len() % BITS_PER_REGISTER == 0)
            .then(|| self.slots.len() / BITS_PER_REGISTER)
    }

    /// Key bindings as `(division, note)` pairs, in scan order
    pub fn keys(&self) -> impl Iterator<Item = (&str, Note)> {
        self.slots.iter().filter_map(|slot| match slot {
            PositionSlot::Key { division, note } => Some((division.as_str(), *note)),
            _ => None,
        })
    }

    pub fn has_shoes(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, PositionSlot::Shoe { .. }))
    }

    pub fn has_keys(&self) -> bool {
        self.keys().next().is_some()
    }
}

/// Check that no `(division, note)` pair is bound twice across all layouts
pub fn check_unique_keys<'a>(layouts: impl IntoIterator<Item = &'a BankLayout>) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for layout in layouts {
        for (division, note) in layout.keys() {
            if !seen.insert((division, note)) {
                anyhow::bail!("Note {} is bound more than once in division '{}'", note, division);
            }
        }
    }
    Ok(())
}
