//! Pi-Organ
//!
//! Scans organ keyboards and pedalboards wired to 74HC165 shift registers
//! (plus an optional serial aux board carrying pedal bits and swell shoes)
//! and turns contact changes into MIDI.

pub mod aux_frame;
pub mod config;
pub mod delivery;
pub mod edge;
pub mod error;
pub mod hardware;
pub mod layout;
pub mod midi;
pub mod monitor;
pub mod registry;
pub mod scan_loop;
pub mod scanner;
pub mod sink;
pub mod translator;
pub mod transport;

pub use aux_frame::{AuxFrame, AuxReader, ByteSource};
pub use config::AppConfig;
pub use error::{Error, FrameError, Result};
pub use layout::{BankLayout, PositionSlot};
pub use midi::MidiEvent;
pub use registry::{Note, NoteRegistry};
pub use scan_loop::{Phase, ScanLoop};
pub use scanner::{BitSource, ShiftRegisterScanner};
pub use sink::{event_queue, DrainStatus, EventDrain, MidiSink, QueueSink};
pub use translator::EventTranslator;
