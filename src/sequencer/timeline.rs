// Timeline - tempo and step resolution
// Converts between BPM, clock pulses and sequencer steps

use crate::midi::event::PPQN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tempo in BPM (Beats Per Minute), always within [MIN_BPM, MAX_BPM]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 300.0;

    /// Creates a new tempo, clamping out-of-range values.
    /// NaN falls back to the default tempo.
    pub fn new(bpm: f64) -> Self {
        if bpm.is_nan() {
            return Self::default();
        }
        Self {
            bpm: bpm.clamp(Self::MIN_BPM, Self::MAX_BPM),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Interval between two clock pulses: (60 / bpm) / 24, scaled by `clock_factor`
    pub fn pulse_interval(&self, clock_factor: f64) -> Duration {
        let factor = clock_factor.max(0.0001);
        Duration::from_secs_f64(self.beat_duration_seconds() / PPQN as f64 / factor)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Step resolution - how many sequencer steps fit in one beat.
/// Restricted to divisors of 24 so a step is always a whole number of pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Resolution {
    Quarter = 1,
    Eighth = 2,
    Sixteenth = 4,
    ThirtySecond = 8,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Quarter,
        Resolution::Eighth,
        Resolution::Sixteenth,
        Resolution::ThirtySecond,
    ];

    pub fn from_steps_per_beat(steps_per_beat: u8) -> Option<Self> {
        match steps_per_beat {
            1 => Some(Resolution::Quarter),
            2 => Some(Resolution::Eighth),
            4 => Some(Resolution::Sixteenth),
            8 => Some(Resolution::ThirtySecond),
            _ => None,
        }
    }

    /// Parse a button label such as "1/16"
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "1/4" => Some(Resolution::Quarter),
            "1/8" => Some(Resolution::Eighth),
            "1/16" => Some(Resolution::Sixteenth),
            "1/32" => Some(Resolution::ThirtySecond),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Quarter => "1/4",
            Resolution::Eighth => "1/8",
            Resolution::Sixteenth => "1/16",
            Resolution::ThirtySecond => "1/32",
        }
    }

    pub fn steps_per_beat(&self) -> u8 {
        *self as u8
    }

    pub fn ticks_per_step(&self) -> u32 {
        PPQN / self.steps_per_beat() as u32
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Sixteenth
    }
}

impl TryFrom<u8> for Resolution {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Resolution::from_steps_per_beat(value)
            .ok_or_else(|| format!("steps_per_beat must be 1, 2, 4 or 8 (got {})", value))
    }
}

impl From<Resolution> for u8 {
    fn from(value: Resolution) -> Self {
        value.steps_per_beat()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
