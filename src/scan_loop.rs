//! Top-level scan driver
//!
//! Sources (shift register banks and the aux board) are visited round-robin.
//! Each visit walks Idle → Scanning → Translating → Dispatching → Idle. All
//! per-source state lives here; nothing is global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::aux_frame::{AuxReader, ByteSource, MAX_AUX_BITS};
use crate::edge::{BankState, StableFilter};
use crate::error::{Error, Result};
use crate::layout::BankLayout;
use crate::midi::MidiEvent;
use crate::registry::NoteRegistry;
use crate::scanner::BitSource;
use crate::sink::MidiSink;
use crate::translator::EventTranslator;

/// Cycles between periodic timing reports at `debug` level
const REPORT_EVERY: u64 = 10_000;

/// Where the loop is within a source visit.
///
/// Back to `Idle` after every successful or skipped visit. When a visit fails
/// the phase it failed in is kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning(usize),
    Translating(usize),
    Dispatching(usize),
}

enum Input {
    Bank(Box<dyn BitSource>),
    Aux(AuxReader<Box<dyn ByteSource>>),
}

/// Raw data from one source visit
struct Sample {
    bits: Vec<bool>,
    readings: Vec<u32>,
}

struct Source {
    name: String,
    input: Input,
    filter: StableFilter,
    state: BankState,
    keys: EventTranslator,
    shoes: EventTranslator,
}

impl Source {
    /// Read the input; `None` when the aux board has nothing new
    fn sample(&mut self) -> Result<Option<Sample>> {
        match &mut self.input {
            Input::Bank(scanner) => Ok(Some(Sample {
                bits: scanner.scan()?,
                readings: Vec::new(),
            })),
            Input::Aux(reader) => Ok(reader.poll()?.map(|frame| Sample {
                bits: frame.bit_vector(self.state.len()),
                readings: frame.readings,
            })),
        }
    }

    fn translate(&mut self, sample: Sample) -> Result<Vec<MidiEvent>> {
        let bits = self.filter.apply(&sample.bits)?;
        let changed = self.state.diff(&bits)?;
        if !changed.is_empty() {
            trace!("{}: positions {:?} changed", self.name, changed);
        }

        let mut events = self.keys.on_bits(&changed, &bits);
        events.extend(self.shoes.on_readings(&sample.readings));
        Ok(events)
    }
}

/// Scans every configured source and dispatches the resulting events
pub struct ScanLoop<S> {
    sources: Vec<Source>,
    sink: S,
    registry: NoteRegistry,
    debounce_scans: u32,
    next: usize,
    phase: Phase,
    cycles: u64,
}

impl<S: MidiSink> ScanLoop<S> {
    pub fn new(registry: NoteRegistry, sink: S) -> Self {
        Self {
            sources: Vec::new(),
            sink,
            registry,
            debounce_scans: 0,
            next: 0,
            phase: Phase::Idle,
            cycles: 0,
        }
    }

    /// Require a level to be seen on `scans` consecutive scans before reporting it
    pub fn with_debounce(mut self, scans: u32) -> Self {
        self.debounce_scans = scans;
        self
    }

    /// Add a shift register bank; its width must match the layout
    pub fn add_bank(
        &mut self,
        name: impl Into<String>,
        scanner: Box<dyn BitSource>,
        layout: &BankLayout,
    ) -> Result<()> {
        if scanner.width() != layout.len() {
            return Err(Error::LengthMismatch {
                expected: layout.len(),
                actual: scanner.width(),
            });
        }

        let source = Source {
            name: name.into(),
            input: Input::Bank(scanner),
            filter: StableFilter::new(layout.len(), self.debounce_scans),
            state: BankState::released(layout.len()),
            keys: EventTranslator::new(layout, &self.registry)?,
            shoes: EventTranslator::new(&BankLayout::default(), &self.registry)?,
        };
        self.sources.push(source);
        Ok(())
    }

    /// Add the aux board; `shoes` maps the record's reading fields
    pub fn add_aux(
        &mut self,
        name: impl Into<String>,
        reader: AuxReader<Box<dyn ByteSource>>,
        layout: &BankLayout,
        shoes: &BankLayout,
    ) -> Result<()> {
        if layout.len() > MAX_AUX_BITS {
            return Err(Error::LengthMismatch {
                expected: MAX_AUX_BITS,
                actual: layout.len(),
            });
        }
        if reader.readings() != shoes.len() {
            return Err(Error::LengthMismatch {
                expected: shoes.len(),
                actual: reader.readings(),
            });
        }

        let source = Source {
            name: name.into(),
            input: Input::Aux(reader),
            filter: StableFilter::new(layout.len(), self.debounce_scans),
            state: BankState::released(layout.len()),
            keys: EventTranslator::new(layout, &self.registry)?,
            shoes: EventTranslator::new(shoes, &self.registry)?,
        };
        self.sources.push(source);
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Last recorded bits of a source, by name
    pub fn state_of(&self, name: &str) -> Option<&[bool]> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.state.bits())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Visit the next source. Returns the number of events dispatched.
    ///
    /// Frame and range errors are logged and skipped. Pin, serial and sink
    /// errors are returned.
    pub fn step(&mut self) -> Result<usize> {
        if self.sources.is_empty() {
            return Ok(0);
        }

        let idx = self.next;
        self.next = (self.next + 1) % self.sources.len();
        if self.next == 0 {
            self.cycles += 1;
        }

        match self.visit(idx) {
            Ok(dispatched) => {
                self.phase = Phase::Idle;
                Ok(dispatched)
            }
            Err(e) if e.is_recoverable() => {
                debug!("{}: skipping cycle: {}", self.sources[idx].name, e);
                self.phase = Phase::Idle;
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn visit(&mut self, idx: usize) -> Result<usize> {
        self.phase = Phase::Scanning(idx);
        let Some(sample) = self.sources[idx].sample()? else {
            return Ok(0);
        };

        self.phase = Phase::Translating(idx);
        let events = self.sources[idx].translate(sample)?;

        self.phase = Phase::Dispatching(idx);
        for event in &events {
            trace!("{}: dispatching {}", self.sources[idx].name, event);
            self.sink.send(*event)?;
        }

        Ok(events.len())
    }

    /// Visit every source once
    pub fn run_cycle(&mut self) -> Result<usize> {
        let mut dispatched = 0;
        for _ in 0..self.sources.len() {
            dispatched += self.step()?;
        }
        Ok(dispatched)
    }

    /// Scan until `stop` is set; the current cycle always completes
    pub fn run(&mut self, stop: &AtomicBool) -> Result<u64> {
        if self.sources.is_empty() {
            warn!("No sources configured, nothing to scan");
            return Ok(0);
        }

        info!("Scanning {} source(s)", self.sources.len());
        let started = self.cycles;
        let mut window = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            self.run_cycle()?;

            if self.cycles % REPORT_EVERY == 0 {
                debug!(
                    "{} cycles, {:.2} ms per cycle",
                    self.cycles,
                    window.elapsed().as_secs_f64() * 1000.0 / REPORT_EVERY as f64
                );
                window = Instant::now();
            }
        }

        info!("Scan loop stopped after {} cycles", self.cycles - started);
        Ok(self.cycles - started)
    }
}
