// Clip - recorded note events of one session cell and their playback position

use serde::{Deserialize, Serialize};

pub const NUM_SCENES: usize = 8;
pub const NUM_TRACKS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClipState {
    /// Idle. May still hold events from an earlier recording (a stopped clip).
    #[default]
    Empty,
    /// Waiting for the next measure to start recording
    QueuedRecord,
    Recording,
    /// Waiting for the next measure to stop recording
    WaitEndRecord,
    /// Waiting for the next measure to start playing
    Queued,
    Playing,
}

impl ClipState {
    pub fn is_recording(&self) -> bool {
        matches!(self, ClipState::Recording | ClipState::WaitEndRecord)
    }
}

/// One recorded note. Steps are relative to the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: u8,
    pub velocity: u8,
    pub start: u32,
    /// None while the key is still held; such events are never played back
    pub end: Option<u32>,
}

impl NoteEvent {
    pub fn is_finalized(&self) -> bool {
        self.end.is_some()
    }
}

/// Position of a clip in the 8x8 matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipSlot {
    pub scene: usize,
    pub track: usize,
}

impl ClipSlot {
    pub fn new(scene: usize, track: usize) -> Option<Self> {
        (scene < NUM_SCENES && track < NUM_TRACKS).then_some(Self { scene, track })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clip {
    pub state: ClipState,
    pub events: Vec<NoteEvent>,
    /// Loop length in steps; a whole number of measures once recording is committed
    pub length: u32,
    /// Global step at which recording began
    pub record_start_step: u64,
    /// Measure counter value at which recording began
    pub record_start_measure: u64,
    /// Next step to play, in `[0, length)` while playing
    pub playhead_step: u32,
    /// Stop at the end of the current loop instead of wrapping
    pub stop_after_end: bool,
}

impl Clip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Back to a blank cell, discarding all events
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Append a note-on at `step`
    pub fn record_note_on(&mut self, note: u8, velocity: u8, step: u32) {
        self.events.push(NoteEvent {
            note,
            velocity,
            start: step,
            end: None,
        });
    }

    /// Close the most recently opened event for `note`.
    /// Returns false when no open event exists.
    pub fn record_note_off(&mut self, note: u8, step: u32) -> bool {
        let Some(event) = self
            .events
            .iter_mut()
            .rev()
            .find(|e| e.note == note && e.end.is_none())
        else {
            return false;
        };

        // A note released in its own step still lasts one step
        let end = step.max(event.start + 1);
        event.end = Some(end);
        self.length = self.length.max(end + 1);
        true
    }

    /// Events that take part in playback
    pub fn finalized_events(&self) -> impl Iterator<Item = &NoteEvent> {
        self.events.iter().filter(|e| e.is_finalized())
    }

    /// Round the length up to whole measures (at least `min_measures`)
    pub fn round_length_to_measures(&mut self, min_measures: u64, steps_per_measure: u32) {
        let steps_per_measure = steps_per_measure.max(1);
        let from_content = self.length.div_ceil(steps_per_measure) as u64;
        let measures = min_measures.max(from_content).max(1);
        self.length = (measures as u32).saturating_mul(steps_per_measure);
    }

    /// Snap starts and ends to `grid` steps; the length grows if an end moves past it.
    /// Events keep at least `grid` steps of duration.
    pub fn quantize(&mut self, grid: u32) {
        let grid = grid.max(1);
        let snap = |step: u32| ((step + grid / 2) / grid) * grid;

        for event in &mut self.events {
            event.start = snap(event.start);
            if let Some(end) = event.end {
                let end = snap(end).max(event.start + grid);
                event.end = Some(end);
                self.length = self.length.max(end + 1);
            }
        }
    }
}

/// 8x8 grid of clips, rows are scenes and columns are tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipMatrix {
    clips: Vec<Vec<Clip>>,
}

impl ClipMatrix {
    pub fn new() -> Self {
        Self {
            clips: (0..NUM_SCENES)
                .map(|_| (0..NUM_TRACKS).map(|_| Clip::new()).collect())
                .collect(),
        }
    }

    pub fn get(&self, slot: ClipSlot) -> &Clip {
        &self.clips[slot.scene][slot.track]
    }

    pub fn get_mut(&mut self, slot: ClipSlot) -> &mut Clip {
        &mut self.clips[slot.scene][slot.track]
    }

    pub fn slots() -> impl Iterator<Item = ClipSlot> {
        (0..NUM_SCENES)
            .flat_map(|scene| (0..NUM_TRACKS).map(move |track| ClipSlot { scene, track }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClipSlot, &Clip)> {
        Self::slots().map(move |slot| (slot, self.get(slot)))
    }

    /// The single clip currently capturing input, if any
    pub fn recording_slot(&self) -> Option<ClipSlot> {
        self.iter()
            .find(|(_, clip)| clip.state.is_recording())
            .map(|(slot, _)| slot)
    }

    pub fn find_state(&self, state: ClipState) -> Option<ClipSlot> {
        self.iter()
            .find(|(_, clip)| clip.state == state)
            .map(|(slot, _)| slot)
    }
}

impl Default for ClipMatrix {
    fn default() -> Self {
        Self::new()
    }
}
