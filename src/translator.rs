//! Changed positions → MIDI events
//!
//! Each source gets its own translator built from its layout. Keys are
//! resolved against the registry up front, so lookups cannot fail mid-scan.

use tracing::{info, trace, warn};

use crate::error::{Error, Result};
use crate::layout::{BankLayout, PositionSlot};
use crate::midi::{MidiEvent, KEY_VELOCITY, VOLUME_CONTROLLER};
use crate::registry::{Note, NoteRegistry};

/// Reduce an 8-bit reading to a 7-bit MIDI value by dropping the low bit
pub fn quantize(raw: u32) -> Result<u8> {
    let value = raw >> 1;
    if value > 127 {
        return Err(Error::OutOfRangeValue { raw });
    }
    Ok(value as u8)
}

/// Last reported value of a continuous controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShoeState {
    value: Option<u8>,
}

impl ShoeState {
    pub fn value(&self) -> Option<u8> {
        self.value
    }

    /// Store a new quantized value, returning it when it differs from a known previous one
    fn update(&mut self, value: u8) -> Option<u8> {
        let previous = self.value.replace(value);
        match previous {
            Some(old) if old != value => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Binding {
    Key {
        division: String,
        note: Note,
        channel: u8,
        midi_note: u8,
    },
    Shoe {
        name: String,
        channel: u8,
        state: ShoeState,
    },
    Unbound,
}

/// Translates one source's changes into MIDI events
#[derive(Debug, Clone)]
pub struct EventTranslator {
    bindings: Vec<Binding>,
}

impl EventTranslator {
    /// Resolve every key of `layout` through `registry`
    pub fn new(layout: &BankLayout, registry: &NoteRegistry) -> Result<Self> {
        let bindings = layout
            .slots()
            .iter()
            .map(|slot| {
                Ok(match slot {
                    PositionSlot::Key { division, note } => Binding::Key {
                        division: division.clone(),
                        note: *note,
                        channel: registry.channel_of(division)?,
                        midi_note: registry.midi_note_of(note.name())?,
                    },
                    PositionSlot::Shoe { name, channel } => Binding::Shoe {
                        name: name.clone(),
                        channel: *channel,
                        state: ShoeState::default(),
                    },
                    PositionSlot::Unbound => Binding::Unbound,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { bindings })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Event for a key position that changed to `level`.
    ///
    /// Low (grounded contact) is note-on, high (open contact) is note-off.
    pub fn on_bit(&self, index: usize, level: bool) -> Option<MidiEvent> {
        match self.bindings.get(index)? {
            Binding::Key {
                division,
                note,
                channel,
                midi_note,
            } => {
                let (channel, note_number) = (*channel, *midi_note);
                if level {
                    info!("NOTE OFF: {} {}", division, note);
                    Some(MidiEvent::NoteOff {
                        channel,
                        note: note_number,
                        velocity: KEY_VELOCITY,
                    })
                } else {
                    info!("NOTE ON: {} {}", division, note);
                    Some(MidiEvent::NoteOn {
                        channel,
                        note: note_number,
                        velocity: KEY_VELOCITY,
                    })
                }
            }
            Binding::Unbound => None,
            Binding::Shoe { name, .. } => {
                trace!("Ignoring bit change on shoe slot '{}'", name);
                None
            }
        }
    }

    /// Events for every changed index, in order
    pub fn on_bits(&self, changed: &[usize], bits: &[bool]) -> Vec<MidiEvent> {
        changed
            .iter()
            .filter_map(|&idx| bits.get(idx).and_then(|&level| self.on_bit(idx, level)))
            .collect()
    }

    /// Feed a raw controller reading to a shoe position.
    ///
    /// The first reading only primes the state; afterwards a volume change is
    /// emitted whenever the quantized value moves.
    pub fn on_reading(&mut self, index: usize, raw: u32) -> Result<Option<MidiEvent>> {
        let Some(Binding::Shoe { name, channel, state }) = self.bindings.get_mut(index) else {
            return Ok(None);
        };

        let value = quantize(raw)?;
        Ok(state.update(value).map(|value| {
            info!("VOLUME: {} {}", name, value);
            MidiEvent::ControlChange {
                channel: *channel,
                controller: VOLUME_CONTROLLER,
                value,
            }
        }))
    }

    /// Feed a full set of readings; out-of-range ones are logged and dropped
    pub fn on_readings(&mut self, readings: &[u32]) -> Vec<MidiEvent> {
        let mut events = Vec::new();
        for (idx, &raw) in readings.iter().enumerate() {
            match self.on_reading(idx, raw) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Discarding reading {} of shoe {}: {}", raw, idx, e),
            }
        }
        events
    }

    /// Current value of the shoe at `index`, if it is a shoe and has been read
    pub fn shoe_value(&self, index: usize) -> Option<u8> {
        match self.bindings.get(index)? {
            Binding::Shoe { state, .. } => state.value(),
            _ => None,
        }
    }
}
