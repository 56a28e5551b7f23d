// Sampler - persisted voice settings shared with the audio sampler

pub mod settings;

pub use settings::{GlobalSettings, SamplerSettings, SettingsError, VoiceSettings};
