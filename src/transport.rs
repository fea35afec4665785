//! MIDI transports
//!
//! A transport is where the delivery task writes events: a local MIDI output
//! port, the raveloxmidi RTP-MIDI daemon, or the log.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use midir::{MidiOutput, MidiOutputConnection};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::SinkConfig;
use crate::midi::{format_hex, MidiEvent};

/// Marker byte raveloxmidi expects in front of every MIDI message
pub const RTP_MIDI_MAGIC: u8 = 0xAA;

/// Client name registered with the MIDI subsystem
const CLIENT_NAME: &str = "Pi-Organ";

/// Output side of the gateway
#[async_trait]
pub trait Transport: Send {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Write one event
    async fn deliver(&mut self, event: &MidiEvent) -> Result<()>;

    /// Close the underlying port or socket
    async fn shutdown(&mut self) -> Result<()>;
}

/// Open the transport described by `config`
pub async fn connect(config: &SinkConfig) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match config {
        SinkConfig::Midi { port } => Box::new(MidirTransport::open(port)?),
        SinkConfig::Rtp { host, port } => Box::new(RtpMidiTransport::connect(host, *port).await?),
        SinkConfig::Console => Box::new(ConsoleTransport::new("console")),
    };
    info!("🔌 Transport '{}' ready", transport.name());
    Ok(transport)
}

/// Sends events to a MIDI output port
pub struct MidirTransport {
    name: String,
    connection: Option<MidiOutputConnection>,
}

impl MidirTransport {
    /// Connect to the first output port whose name contains `pattern`
    /// (case-insensitive). On Unix a virtual port named `pattern` is created
    /// when no existing port matches.
    pub fn open(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let connection = match find_output_port(&midi_out, pattern) {
            Some((port, name)) => {
                let connection = midi_out
                    .connect(&port, "pi-organ-out")
                    .map_err(|e| anyhow!("Failed to connect to '{}': {}", name, e))?;
                info!("MIDI output connected: '{}'", name);
                connection
            }
            None => open_virtual(midi_out, pattern)?,
        };

        Ok(Self {
            name: format!("midi:{}", pattern),
            connection: Some(connection),
        })
    }
}

#[cfg(unix)]
fn open_virtual(midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection> {
    use midir::os::unix::VirtualOutput;

    let connection = midi_out
        .create_virtual(name)
        .map_err(|e| anyhow!("Failed to create virtual port '{}': {}", name, e))?;
    info!("No output port matches '{}', created virtual port", name);
    Ok(connection)
}

#[cfg(not(unix))]
fn open_virtual(_midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection> {
    Err(anyhow!("MIDI output port '{}' not found", name))
}

fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(midir::MidiOutputPort, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Names of every MIDI output port currently visible
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

#[async_trait]
impl Transport for MidirTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&mut self, event: &MidiEvent) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow!("{} is closed", self.name))?;
        let bytes = event.encode();
        connection
            .send(&bytes)
            .map_err(|e| anyhow!("MIDI send failed: {}", e))?;
        debug!("TX {} [{}]", event, format_hex(&bytes));
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            connection.close();
            debug!("{} closed", self.name);
        }
        Ok(())
    }
}

/// Datagram sent to raveloxmidi for one event
pub fn rtp_datagram(event: &MidiEvent) -> [u8; 4] {
    let [status, data1, data2] = event.encode();
    [RTP_MIDI_MAGIC, status, data1, data2]
}

/// Sends events to a local raveloxmidi daemon over UDP
pub struct RtpMidiTransport {
    name: String,
    socket: UdpSocket,
}

impl RtpMidiTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind UDP socket")?;
        socket
            .connect((host, port))
            .await
            .with_context(|| format!("Failed to reach raveloxmidi at {}:{}", host, port))?;

        Ok(Self {
            name: format!("rtp:{}:{}", host, port),
            socket,
        })
    }
}

#[async_trait]
impl Transport for RtpMidiTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&mut self, event: &MidiEvent) -> Result<()> {
        let datagram = rtp_datagram(event);
        self.socket
            .send(&datagram)
            .await
            .with_context(|| format!("Failed to send {} to {}", event, self.name))?;
        debug!("TX {} [{}]", event, format_hex(&datagram));
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Logs every event instead of sending it
pub struct ConsoleTransport {
    name: String,
    delivered: u64,
}

impl ConsoleTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivered: 0,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&mut self, event: &MidiEvent) -> Result<()> {
        self.delivered += 1;
        info!("🎹 #{} {} [{}]", self.delivered, event, format_hex(&event.encode()));
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("ConsoleTransport '{}' delivered {} events", self.name, self.delivered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_datagram_layout() {
        let event = MidiEvent::NoteOn { channel: 2, note: 60, velocity: 127 };
        assert_eq!(rtp_datagram(&event), [0xAA, 0x92, 60, 127]);

        let event = MidiEvent::ControlChange { channel: 1, controller: 7, value: 90 };
        assert_eq!(rtp_datagram(&event), [0xAA, 0xB1, 7, 90]);
    }

    #[tokio::test]
    async fn test_rtp_transport_sends_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut transport = RtpMidiTransport::connect("127.0.0.1", port).await.unwrap();
        transport
            .deliver(&MidiEvent::NoteOff { channel: 0, note: 36, velocity: 127 })
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let len = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0xAA, 0x80, 36, 127]);
    }

    #[tokio::test]
    async fn test_console_transport_counts() {
        let mut transport = ConsoleTransport::new("test");
        let event = MidiEvent::NoteOn { channel: 0, note: 40, velocity: 127 };

        transport.deliver(&event).await.unwrap();
        transport.deliver(&event).await.unwrap();
        assert_eq!(transport.delivered(), 2);
        assert_eq!(transport.name(), "test");
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_console() {
        let transport = connect(&SinkConfig::Console).await.unwrap();
        assert_eq!(transport.name(), "console");
    }
}
