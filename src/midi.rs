//! MIDI event type and wire encoding

use std::fmt;

/// Velocity used for every key event
pub const KEY_VELOCITY: u8 = 127;

/// Controller number of channel volume
pub const VOLUME_CONTROLLER: u8 = 7;

/// MIDI event produced by the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), controller (0-127), value (0-127)
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiEvent {
    /// Encode as a 3-byte channel message `{status, data1, data2}`
    pub fn encode(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOff { channel, note, velocity } => {
                [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::ControlChange { channel, controller, value } => {
                [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOff { channel, .. }
            | MidiEvent::NoteOn { channel, .. }
            | MidiEvent::ControlChange { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiEvent::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiEvent::ControlChange { channel, controller, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, controller, value)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_note_on() {
        let event = MidiEvent::NoteOn { channel: 2, note: 60, velocity: 127 };
        assert_eq!(event.encode(), [0x92, 60, 127]);
    }

    #[test]
    fn test_encode_note_off() {
        let event = MidiEvent::NoteOff { channel: 0, note: 36, velocity: 127 };
        assert_eq!(event.encode(), [0x80, 36, 127]);
    }

    #[test]
    fn test_encode_volume_change() {
        let event = MidiEvent::ControlChange {
            channel: 1,
            controller: VOLUME_CONTROLLER,
            value: 90,
        };
        assert_eq!(event.encode(), [0xB1, 7, 90]);
    }

    #[test]
    fn test_display_uses_one_based_channel() {
        let event = MidiEvent::NoteOn { channel: 0, note: 36, velocity: 127 };
        assert_eq!(event.to_string(), "NoteOn ch:1 n:36 v:127");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xAA, 0x90, 0x24, 0x7F]), "AA 90 24 7F");
    }
}
