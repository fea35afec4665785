//! Event hand-off from the scan loop
//!
//! The scan loop is the only producer. Events either go straight into a
//! collection (tests) or through an unbounded queue drained by the delivery
//! task. The queue never drops events.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::error::{Error, Result};
use crate::midi::MidiEvent;

/// Destination of translated events
pub trait MidiSink: Send {
    fn send(&mut self, event: MidiEvent) -> Result<()>;
}

impl MidiSink for Vec<MidiEvent> {
    fn send(&mut self, event: MidiEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

/// Producer half of the event queue
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: Sender<MidiEvent>,
}

/// Consumer half of the event queue
#[derive(Debug)]
pub struct EventDrain {
    rx: Receiver<MidiEvent>,
}

/// State of the queue after a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Producer still alive, queue empty for now
    Open,
    /// Producer gone and every event consumed
    Closed,
}

/// Create a connected producer/consumer pair
pub fn event_queue() -> (QueueSink, EventDrain) {
    let (tx, rx) = channel::unbounded();
    (QueueSink { tx }, EventDrain { rx })
}

impl MidiSink for QueueSink {
    fn send(&mut self, event: MidiEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::Sink("delivery task has stopped".to_string()))
    }
}

impl EventDrain {
    /// Take every pending event without blocking
    pub fn drain(&self) -> (Vec<MidiEvent>, DrainStatus) {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return (events, DrainStatus::Open),
                Err(TryRecvError::Disconnected) => return (events, DrainStatus::Closed),
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(n: u8) -> MidiEvent {
        MidiEvent::NoteOn { channel: 0, note: n, velocity: 127 }
    }

    #[test]
    fn test_drain_takes_everything_in_order() {
        let (mut sink, drain) = event_queue();
        for n in 36..46 {
            sink.send(note(n)).unwrap();
        }
        assert_eq!(drain.pending(), 10);

        let (events, status) = drain.drain();
        assert_eq!(events, (36..46).map(note).collect::<Vec<_>>());
        assert_eq!(status, DrainStatus::Open);

        let (events, status) = drain.drain();
        assert!(events.is_empty());
        assert_eq!(status, DrainStatus::Open);
    }

    #[test]
    fn test_drain_after_producer_dropped() {
        let (mut sink, drain) = event_queue();
        sink.send(note(40)).unwrap();
        drop(sink);

        // Pending events still come out before the queue reports closed
        let (events, status) = drain.drain();
        assert_eq!(events, vec![note(40)]);
        assert_eq!(status, DrainStatus::Closed);
    }

    #[test]
    fn test_send_fails_when_consumer_gone() {
        let (mut sink, drain) = event_queue();
        drop(drain);
        assert!(matches!(sink.send(note(40)), Err(Error::Sink(_))));
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<MidiEvent> = Vec::new();
        sink.send(note(50)).unwrap();
        assert_eq!(sink, vec![note(50)]);
    }
}
