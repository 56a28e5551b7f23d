// Track registry - which instrument each session column addresses

use super::clip::NUM_TRACKS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Logical instrument name, resolved to a port by the router
    pub instrument: String,
    /// Pad colour for renderers, e.g. "#ff8800"
    #[serde(default)]
    pub color: Option<String>,
}

impl TrackInfo {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Columns without an entry have no instrument; their clips record and play silently
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRegistry {
    tracks: Vec<Option<TrackInfo>>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self {
            tracks: vec![None; NUM_TRACKS],
        }
    }

    /// Assign tracks left to right; entries past the last column are dropped
    pub fn from_tracks(tracks: impl IntoIterator<Item = TrackInfo>) -> Self {
        let mut registry = Self::new();
        for (index, info) in tracks.into_iter().enumerate() {
            if index >= NUM_TRACKS {
                log::warn!("Ignoring track {} ({}): only {} columns", index, info.instrument, NUM_TRACKS);
                continue;
            }
            registry.tracks[index] = Some(info);
        }
        registry
    }

    pub fn set(&mut self, track: usize, info: Option<TrackInfo>) -> bool {
        match self.tracks.get_mut(track) {
            Some(slot) => {
                *slot = info;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, track: usize) -> Option<&TrackInfo> {
        self.tracks.get(track).and_then(Option::as_ref)
    }

    pub fn instrument(&self, track: usize) -> Option<&str> {
        self.get(track).map(|info| info.instrument.as_str())
    }

    pub fn color(&self, track: usize) -> Option<&str> {
        self.get(track).and_then(|info| info.color.as_deref())
    }
}
