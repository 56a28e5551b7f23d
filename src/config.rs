// Workstation configuration - instruments, tracks and sequencer output (JSON)

use crate::midi::router::PortQuirks;
use crate::sequencer::step::DrumOutput;
use crate::sequencer::timeline::{Resolution, Tempo};
use crate::session::tracks::{TrackInfo, TrackRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuirksConfig {
    /// Send START twice with this gap in milliseconds
    pub double_start_gap_ms: Option<u64>,
}

impl QuirksConfig {
    pub fn to_quirks(&self) -> PortQuirks {
        PortQuirks {
            double_start_gap: self.double_start_gap_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    /// System name of the output port; the instrument is silent when absent
    #[serde(default)]
    pub output_port: Option<String>,
    /// MIDI channel 0-15 for the instrument's channel messages
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub quirks: QuirksConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Instrument playing the drum grid. Its port never receives START/STOP.
    pub output_instrument: Option<String>,
    pub start_note: u8,
    pub velocity: u8,
    pub note_length_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        let drum = DrumOutput::default();
        Self {
            output_instrument: None,
            start_note: drum.start_note,
            velocity: drum.velocity,
            note_length_ms: drum.note_length.as_millis() as u64,
        }
    }
}

impl SequencerConfig {
    pub fn drum_output(&self) -> DrumOutput {
        DrumOutput {
            instrument: self.output_instrument.clone(),
            start_note: self.start_note,
            velocity: self.velocity,
            note_length: Duration::from_millis(self.note_length_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkstationConfig {
    pub tempo_bpm: f64,
    pub steps_per_beat: u8,
    pub clock_factor: f64,
    pub input_queue_capacity: usize,
    /// Port recorded from; the first usable input when absent
    pub recording_input: Option<String>,
    pub sequencer: SequencerConfig,
    pub instruments: Vec<InstrumentConfig>,
    /// Session columns, left to right
    pub tracks: Vec<TrackInfo>,
}

impl Default for WorkstationConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: Tempo::default().bpm(),
            steps_per_beat: Resolution::default().steps_per_beat(),
            clock_factor: 1.0,
            input_queue_capacity: 512,
            recording_input: None,
            sequencer: SequencerConfig::default(),
            instruments: Vec::new(),
            tracks: Vec::new(),
        }
    }
}

impl WorkstationConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::sanitized)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration problems are never fatal: log and run with defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.as_ref().display());
                config
            }
            Err(e) => {
                log::warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace out-of-range values with usable ones
    pub fn sanitized(mut self) -> Self {
        let tempo = Tempo::new(self.tempo_bpm);
        if tempo.bpm() != self.tempo_bpm {
            log::warn!("tempo_bpm {} out of range, using {}", self.tempo_bpm, tempo.bpm());
            self.tempo_bpm = tempo.bpm();
        }
        if Resolution::from_steps_per_beat(self.steps_per_beat).is_none() {
            log::warn!(
                "steps_per_beat {} is not 1, 2, 4 or 8, using {}",
                self.steps_per_beat,
                Resolution::default().steps_per_beat()
            );
            self.steps_per_beat = Resolution::default().steps_per_beat();
        }
        if !self.clock_factor.is_finite() || self.clock_factor <= 0.0 {
            self.clock_factor = 1.0;
        }
        self.input_queue_capacity = self.input_queue_capacity.max(MIN_QUEUE_CAPACITY);
        self.sequencer.start_note = self.sequencer.start_note.min(127);
        self.sequencer.velocity = self.sequencer.velocity.clamp(1, 127);
        self
    }

    /// Structural checks that cannot be repaired silently
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for instrument in &self.instruments {
            if instrument.name.trim().is_empty() {
                return Err(ConfigError::Invalid("instrument with empty name".to_string()));
            }
            if instrument.channel > 15 {
                return Err(ConfigError::Invalid(format!(
                    "instrument '{}' uses channel {}, expected 0-15",
                    instrument.name, instrument.channel
                )));
            }
            if !seen.insert(instrument.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "instrument '{}' defined twice",
                    instrument.name
                )));
            }
        }
        Ok(())
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.tempo_bpm)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_steps_per_beat(self.steps_per_beat).unwrap_or_default()
    }

    pub fn track_registry(&self) -> TrackRegistry {
        TrackRegistry::from_tracks(self.tracks.iter().cloned())
    }

    pub fn instrument(&self, name: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.name == name)
    }
}
