// Sampler settings - per-voice gain, envelope and trim stored as volume.json
// in each sample folder

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "volume.json";

/// Smallest gap kept between trim start and trim end
const MIN_TRIM_SPAN: f32 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub volume: f32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

/// Settings of the sample mapped to one note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub volume: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
    /// Playback window as fractions of the sample length
    pub trim_start: f32,
    pub trim_end: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            attack_seconds: 0.002,
            release_seconds: 0.080,
            trim_start: 0.0,
            trim_end: 1.0,
        }
    }
}

/// Contents of volume.json: `{"global": {...}, "samples": {"<note>": {...}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerSettings {
    #[serde(default)]
    pub global: GlobalSettings,
    #[serde(default)]
    pub samples: BTreeMap<u8, VoiceSettings>,
}

impl SamplerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_in(folder: &Path) -> PathBuf {
        folder.join(SETTINGS_FILE_NAME)
    }

    /// Load from an explicit file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json_str = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json_str).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save as pretty-printed JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let json_str = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json_str).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, folder: &Path) -> Result<(), SettingsError> {
        self.save_to_file(Self::path_in(folder))
    }

    /// Read volume.json from `folder`. A missing or unreadable file is replaced
    /// with defaults, which are written back so the file exists next time.
    pub fn load_or_create(folder: &Path) -> Self {
        let path = Self::path_in(folder);
        if path.is_file() {
            match Self::load_from_file(&path) {
                Ok(settings) => {
                    log::info!("Loaded {}", path.display());
                    return settings;
                }
                Err(e) => log::warn!("{}, using defaults", e),
            }
        }

        let settings = Self::default();
        match settings.save_to_file(&path) {
            Ok(()) => log::info!("Created {}", path.display()),
            Err(e) => log::warn!("Could not create default settings: {}", e),
        }
        settings
    }

    /// Settings for `note`, defaults when the note has no entry
    pub fn voice(&self, note: u8) -> VoiceSettings {
        self.samples.get(&note).copied().unwrap_or_default()
    }

    fn voice_mut(&mut self, note: u8) -> &mut VoiceSettings {
        self.samples.entry(note).or_default()
    }

    pub fn set_global_volume(&mut self, volume: f32) {
        self.global.volume = volume.max(0.0);
    }

    pub fn set_volume(&mut self, note: u8, volume: f32) {
        self.voice_mut(note).volume = volume.max(0.0);
    }

    pub fn set_attack(&mut self, note: u8, seconds: f32) {
        self.voice_mut(note).attack_seconds = seconds.max(0.0);
    }

    pub fn set_release(&mut self, note: u8, seconds: f32) {
        self.voice_mut(note).release_seconds = seconds.max(0.0);
    }

    /// Kept in `[0, trim_end - 0.01]`
    pub fn set_trim_start(&mut self, note: u8, value: f32) {
        let voice = self.voice_mut(note);
        voice.trim_start = value.min(voice.trim_end - MIN_TRIM_SPAN).max(0.0);
    }

    /// Kept in `[trim_start + 0.01, 1]`
    pub fn set_trim_end(&mut self, note: u8, value: f32) {
        let voice = self.voice_mut(note);
        voice.trim_end = value.min(1.0).max(voice.trim_start + MIN_TRIM_SPAN);
    }
}
