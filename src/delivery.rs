//! Delivery task
//!
//! Drains the event queue once per tick and writes everything to the
//! transport. Finishes once the scan loop has dropped its end of the queue
//! and every event has been delivered.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::sink::{DrainStatus, EventDrain};
use crate::transport::Transport;

/// Run until the queue closes, returning the number of events delivered
pub async fn run(drain: EventDrain, mut transport: Box<dyn Transport>, period: Duration) -> Result<u64> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut delivered = 0u64;
    loop {
        ticker.tick().await;

        let (events, status) = drain.drain();
        for event in &events {
            match transport.deliver(event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver {} via {}: {:#}", event, transport.name(), e),
            }
        }
        if events.len() > 1 {
            debug!("Delivered batch of {} events", events.len());
        }

        if status == DrainStatus::Closed {
            break;
        }
    }

    transport.shutdown().await?;
    info!("Delivery via '{}' finished ({} events)", transport.name(), delivered);
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;
    use crate::sink::{event_queue, MidiSink};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records what it is given
    struct Recorder {
        log: Arc<Mutex<Vec<MidiEvent>>>,
        closed: Arc<Mutex<bool>>,
        fail_note: Option<u8>,
    }

    #[async_trait]
    impl Transport for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn deliver(&mut self, event: &MidiEvent) -> Result<()> {
            if let MidiEvent::NoteOn { note, .. } = event {
                if Some(*note) == self.fail_note {
                    anyhow::bail!("port gone");
                }
            }
            self.log.lock().unwrap().push(*event);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn recorder(fail_note: Option<u8>) -> (Box<dyn Transport>, Arc<Mutex<Vec<MidiEvent>>>, Arc<Mutex<bool>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let transport = Recorder {
            log: log.clone(),
            closed: closed.clone(),
            fail_note,
        };
        (Box::new(transport), log, closed)
    }

    fn note(n: u8) -> MidiEvent {
        MidiEvent::NoteOn { channel: 0, note: n, velocity: 127 }
    }

    #[tokio::test]
    async fn test_delivers_everything_then_stops() {
        let (mut sink, drain) = event_queue();
        let (transport, log, closed) = recorder(None);

        let task = tokio::spawn(run(drain, transport, Duration::from_millis(1)));

        for n in 36..40 {
            sink.send(note(n)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.send(note(40)).unwrap();
        drop(sink);

        let delivered = task.await.unwrap().unwrap();
        assert_eq!(delivered, 5);
        assert_eq!(*log.lock().unwrap(), (36..41).map(note).collect::<Vec<_>>());
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_skipped() {
        let (mut sink, drain) = event_queue();
        let (transport, log, _closed) = recorder(Some(37));

        for n in 36..39 {
            sink.send(note(n)).unwrap();
        }
        drop(sink);

        let delivered = run(drain, transport, Duration::from_millis(1)).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec![note(36), note(38)]);
    }
}
