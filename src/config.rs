//! Configuration management for Pi-Organ
//!
//! Handles loading, parsing and validating the YAML configuration file. The
//! file is read once at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::fs;

use crate::aux_frame::MAX_AUX_BITS;
use crate::layout::{check_unique_keys, BankLayout, PositionSlot};
use crate::registry::NoteRegistry;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Divisions in channel order (first one is MIDI channel 0)
    pub divisions: Vec<String>,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Consecutive identical scans required before a change is reported (0 = off)
    #[serde(default)]
    pub debounce_scans: u32,
    #[serde(default)]
    pub banks: Vec<BankConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux: Option<AuxConfig>,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Pulse-width timing for the shift registers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Hold time after each load/clock edge, in microseconds
    #[serde(default = "default_settle_us")]
    pub settle_us: u32,
}

/// One chain of 74HC165 registers sharing load, clock and data pins (BCM numbers)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BankConfig {
    pub name: String,
    pub load_pin: u8,
    pub clock_pin: u8,
    pub data_pin: u8,
    pub layout: Vec<SlotConfig>,
}

/// Secondary board reporting its state as ASCII records over serial
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuxConfig {
    #[serde(default = "default_aux_name")]
    pub name: String,
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Bytes requested from the port per poll
    #[serde(default = "default_read_size")]
    pub read_size: usize,
    /// Bit positions of the record's first field
    #[serde(default)]
    pub layout: Vec<SlotConfig>,
    /// Continuous controllers, one per remaining record field
    #[serde(default)]
    pub shoes: Vec<SlotConfig>,
}

/// Layout entry as written in the config file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SlotConfig {
    /// Chromatic run, both ends inclusive (descending when `from` is higher)
    Run {
        division: String,
        from: String,
        to: String,
    },
    Key {
        division: String,
        note: String,
    },
    /// `unbound` consecutive unused positions
    Unbound { unbound: usize },
    Shoe { shoe: String, channel: u8 },
}

/// Where MIDI events are delivered
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Local MIDI output port (ALSA sequencer on Linux)
    Midi {
        #[serde(default = "default_midi_port")]
        port: String,
    },
    /// raveloxmidi RTP-MIDI daemon over UDP
    Rtp {
        #[serde(default = "default_rtp_host")]
        host: String,
        #[serde(default = "default_rtp_port")]
        port: u16,
    },
    /// Log events only
    Console,
}

/// Event delivery task settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// How often pending events are drained to the transport
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_us: default_settle_us(),
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_micros(self.settle_us as u64)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Midi {
            port: default_midi_port(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Build the note registry described by `divisions`
    pub fn registry(&self) -> Result<NoteRegistry> {
        NoteRegistry::new(self.divisions.iter().cloned())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let registry = self.registry()?;

        if self.banks.is_empty() && self.aux.is_none() {
            anyhow::bail!("At least one bank or an aux source must be configured");
        }
        if self.timing.settle_us == 0 {
            anyhow::bail!("timing.settle_us must be at least 1");
        }
        if self.delivery.period_ms == 0 {
            anyhow::bail!("delivery.period_ms must be at least 1");
        }

        let mut names = HashSet::new();
        let mut layouts = Vec::new();

        for (bank_idx, bank) in self.banks.iter().enumerate() {
            if bank.name.is_empty() {
                anyhow::bail!("Bank {} name cannot be empty", bank_idx);
            }
            if !names.insert(bank.name.as_str()) {
                anyhow::bail!("Bank name '{}' is used twice", bank.name);
            }

            let pins = [bank.load_pin, bank.clock_pin, bank.data_pin];
            if pins[0] == pins[1] || pins[0] == pins[2] || pins[1] == pins[2] {
                anyhow::bail!("Bank '{}' must use three distinct pins", bank.name);
            }

            let layout = BankLayout::from_config(&bank.layout)
                .with_context(|| format!("Invalid layout in bank '{}'", bank.name))?;
            if layout.register_count().is_none() {
                anyhow::bail!(
                    "Bank '{}' layout has {} positions (must be a non-zero multiple of 8)",
                    bank.name,
                    layout.len()
                );
            }
            if layout.has_shoes() {
                anyhow::bail!("Bank '{}' layout cannot contain shoes", bank.name);
            }
            Self::validate_keys(&registry, &layout)
                .with_context(|| format!("Invalid layout in bank '{}'", bank.name))?;
            layouts.push(layout);
        }

        if let Some(aux) = &self.aux {
            if !names.insert(aux.name.as_str()) {
                anyhow::bail!("Aux source name '{}' is already used by a bank", aux.name);
            }
            if aux.port.is_empty() {
                anyhow::bail!("Aux port cannot be empty");
            }
            if aux.read_size == 0 {
                anyhow::bail!("Aux read_size must be at least 1");
            }

            let layout = BankLayout::from_config(&aux.layout).context("Invalid aux layout")?;
            if layout.len() > MAX_AUX_BITS {
                anyhow::bail!(
                    "Aux layout has {} positions (at most {} fit in a frame)",
                    layout.len(),
                    MAX_AUX_BITS
                );
            }
            if layout.has_shoes() {
                anyhow::bail!("Aux layout cannot contain shoes (list them under 'shoes')");
            }
            Self::validate_keys(&registry, &layout).context("Invalid aux layout")?;

            let shoes = BankLayout::from_config(&aux.shoes).context("Invalid aux shoes")?;
            if shoes.has_keys() {
                anyhow::bail!("Aux shoes cannot contain keys");
            }
            for slot in shoes.slots() {
                if let PositionSlot::Shoe { name, channel } = slot {
                    if *channel > 15 {
                        anyhow::bail!(
                            "Shoe '{}' has invalid MIDI channel {} (must be 0-15)",
                            name,
                            channel
                        );
                    }
                }
            }

            layouts.push(layout);
        }

        check_unique_keys(&layouts)?;

        Ok(())
    }

    fn validate_keys(registry: &NoteRegistry, layout: &BankLayout) -> Result<()> {
        for (division, _) in layout.keys() {
            registry.channel_of(division)?;
        }
        Ok(())
    }
}

// Default value functions
fn default_settle_us() -> u32 { 5 }
fn default_aux_name() -> String { "aux".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_read_size() -> usize { 256 }
fn default_midi_port() -> String { "Pi-Organ".to_string() }
fn default_rtp_host() -> String { "127.0.0.1".to_string() }
fn default_rtp_port() -> u16 { 5006 }
fn default_period_ms() -> u64 { 1 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
divisions: [pedal, accomp, great, solo]
banks:
  - name: great
    load_pin: 11
    clock_pin: 9
    data_pin: 10
    layout:
      - { division: great, from: C2, to: C7 }
      - { unbound: 3 }
aux:
  port: /dev/ttyACM0
  layout:
    - { division: pedal, from: G4, to: C2 }
  shoes:
    - { shoe: Great, channel: 1 }
    - { shoe: Swell, channel: 2 }
    - { shoe: Crescendo, channel: 3 }
sink:
  kind: rtp
"#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.divisions.len(), 4);
        assert_eq!(config.timing.settle_us, 5);
        assert_eq!(config.debounce_scans, 0);
        assert_eq!(config.banks[0].data_pin, 10);

        let aux = config.aux.as_ref().unwrap();
        assert_eq!(aux.baud_rate, 115_200);
        assert_eq!(aux.read_size, 256);
        assert_eq!(BankLayout::from_config(&aux.layout).unwrap().len(), 32);
        assert_eq!(aux.shoes.len(), 3);

        match &config.sink {
            SinkConfig::Rtp { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(*port, 5006);
            }
            other => panic!("unexpected sink {:?}", other),
        }
    }

    #[test]
    fn test_slot_config_forms() {
        let slots: Vec<SlotConfig> = serde_yaml::from_str(
            r#"
- { division: great, from: C2, to: B2 }
- { division: great, note: C3 }
- { unbound: 4 }
- { shoe: Swell, channel: 2 }
"#,
        )
        .unwrap();

        assert!(matches!(slots[0], SlotConfig::Run { .. }));
        assert!(matches!(slots[1], SlotConfig::Key { .. }));
        assert_eq!(slots[2], SlotConfig::Unbound { unbound: 4 });
        assert!(matches!(slots[3], SlotConfig::Shoe { channel: 2, .. }));
    }

    #[test]
    fn test_rejects_ragged_bank() {
        let yaml = MINIMAL.replace("{ unbound: 3 }", "{ unbound: 2 }");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("multiple of 8"));
    }

    #[test]
    fn test_rejects_unknown_division() {
        let yaml = MINIMAL.replace("division: pedal", "division: swell");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown division 'swell'"));
    }

    #[test]
    fn test_rejects_duplicate_note_in_division() {
        let yaml = MINIMAL.replace("division: pedal", "division: great");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("bound more than once"));
    }

    #[test]
    fn test_rejects_shoe_in_bank() {
        let yaml = MINIMAL.replace("{ unbound: 3 }", "{ unbound: 2 }\n      - { shoe: Great, channel: 1 }");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("cannot contain shoes"));
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = AppConfig::from_yaml(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config.banks.len(), 1);
        assert_eq!(config.aux.as_ref().unwrap().name, "pedal");
        assert!(matches!(config.sink, SinkConfig::Midi { .. }));
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("organ.yaml");
        std::fs::write(&config_path, MINIMAL)?;

        let config = AppConfig::load(&config_path.to_string_lossy()).await?;
        assert_eq!(config.banks[0].name, "great");

        assert!(AppConfig::load("/nonexistent/organ.yaml").await.is_err());
        Ok(())
    }
}
