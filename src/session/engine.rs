// Clip engine - quantized launch, bar-aligned recording and note scheduling
// for the 8x8 session matrix. Driven step by step from the clock thread.

use super::clip::{Clip, ClipMatrix, ClipSlot, ClipState, NoteEvent};
use super::tracks::TrackRegistry;
use super::transition::{ClipInput, ClipView, Effect, transition};
use crate::midi::event::{MidiEvent, midi_note_name};
use crate::sequencer::grid::NUM_STEPS;
use crate::sequencer::outbox::Outbox;
use crate::sequencer::step::{StepEvent, StepListener};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No clip at scene {scene}, track {track}")]
    InvalidSlot { scene: usize, track: usize },

    #[error("Source clip has no events")]
    SourceEmpty,

    #[error("Destination clip is not empty")]
    DestinationNotEmpty,

    #[error("Clip is recording")]
    Recording,
}

/// Per-cell view for renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSnapshot {
    pub slot: ClipSlot,
    pub state: ClipState,
    pub has_events: bool,
    pub stop_after_end: bool,
    pub playhead_step: u32,
    pub length: u32,
    pub color: Option<String>,
}

pub struct ClipEngine {
    matrix: ClipMatrix,
    tracks: TrackRegistry,
    /// Last global step seen, the time base for recorded events
    global_step: u64,
    /// Number of measure starts seen so far
    measure_index: u64,
    steps_per_measure: u32,
    /// Snap grid for `quantize`, in steps
    quantize_grid: u32,
}

impl ClipEngine {
    pub fn new(tracks: TrackRegistry) -> Self {
        Self {
            matrix: ClipMatrix::new(),
            tracks,
            global_step: 0,
            measure_index: 0,
            steps_per_measure: NUM_STEPS as u32,
            quantize_grid: 1,
        }
    }

    fn slot(scene: usize, track: usize) -> Result<ClipSlot, SessionError> {
        ClipSlot::new(scene, track).ok_or(SessionError::InvalidSlot { scene, track })
    }

    pub fn clip(&self, scene: usize, track: usize) -> Option<&Clip> {
        ClipSlot::new(scene, track).map(|slot| self.matrix.get(slot))
    }

    pub fn matrix(&self) -> &ClipMatrix {
        &self.matrix
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn measure_index(&self) -> u64 {
        self.measure_index
    }

    pub fn recording_slot(&self) -> Option<ClipSlot> {
        self.matrix.recording_slot()
    }

    pub fn set_quantize_grid(&mut self, steps: u32) {
        self.quantize_grid = steps.max(1);
    }

    /// Run one input through the transition table and carry out its effects
    fn apply(&mut self, slot: ClipSlot, input: ClipInput, out: &mut Outbox) -> ClipState {
        let clip = self.matrix.get(slot);
        let view = ClipView {
            state: clip.state,
            has_events: clip.has_events(),
            stop_after_end: clip.stop_after_end,
        };
        let next = transition(view, input);
        if !next.changes(view) {
            return view.state;
        }

        for effect in &next.effects {
            self.apply_effect(slot, *effect, out);
        }

        let clip = self.matrix.get_mut(slot);
        clip.state = next.state;
        clip.stop_after_end = next.stop_after_end;
        if next.state == ClipState::Empty {
            clip.playhead_step = 0;
        }

        // Nothing was played into the clip: back to a blank cell
        if next.effects.contains(&Effect::FinishRecording) && clip.finalized_events().next().is_none() {
            clip.clear();
            log::info!("Clip {}/{}: empty recording discarded", slot.scene, slot.track);
        }

        if view.state != clip.state {
            log::info!(
                "Clip {}/{}: {:?} -> {:?}",
                slot.scene,
                slot.track,
                view.state,
                clip.state
            );
        }
        clip.state
    }

    fn apply_effect(&mut self, slot: ClipSlot, effect: Effect, out: &mut Outbox) {
        let clip = self.matrix.get_mut(slot);
        match effect {
            Effect::BeginRecording => {
                clip.events.clear();
                clip.length = 0;
                clip.playhead_step = 0;
                clip.record_start_step = self.global_step;
                clip.record_start_measure = self.measure_index;
            }
            Effect::FinishRecording => {
                let held = clip.events.len();
                clip.events.retain(NoteEvent::is_finalized);
                if clip.events.len() < held {
                    log::debug!("Dropped {} held note(s) at record stop", held - clip.events.len());
                }
                let measures = self
                    .measure_index
                    .saturating_sub(clip.record_start_measure)
                    .max(1);
                clip.round_length_to_measures(measures, self.steps_per_measure);
            }
            Effect::ResetPlayhead => clip.playhead_step = 0,
            Effect::AllNotesOff => {
                if let Some(instrument) = self.tracks.instrument(slot.track) {
                    out.all_notes_off(instrument);
                }
            }
            Effect::ClearEvents => clip.clear(),
        }
    }

    /// Pad press from the controller. Returns the clip's new state.
    ///
    /// Only one clip records at a time: arming a new recording cancels any
    /// other armed clip and is refused while another clip is recording.
    pub fn press_pad(
        &mut self,
        scene: usize,
        track: usize,
        out: &mut Outbox,
    ) -> Result<ClipState, SessionError> {
        let slot = Self::slot(scene, track)?;
        let clip = self.matrix.get(slot);

        if clip.state == ClipState::Empty && !clip.has_events() {
            if let Some(recording) = self.matrix.find_state(ClipState::Recording) {
                log::warn!(
                    "Clip {}/{} is recording, ignoring record request for {}/{}",
                    recording.scene,
                    recording.track,
                    scene,
                    track
                );
                return Ok(ClipState::Empty);
            }
            if let Some(armed) = self.matrix.find_state(ClipState::QueuedRecord) {
                self.apply(armed, ClipInput::Press, out);
            }
        }

        Ok(self.apply(slot, ClipInput::Press, out))
    }

    /// Pad press with the relaunch modifier: restart from the top at the next measure
    pub fn relaunch(
        &mut self,
        scene: usize,
        track: usize,
        out: &mut Outbox,
    ) -> Result<ClipState, SessionError> {
        let slot = Self::slot(scene, track)?;
        Ok(self.apply(slot, ClipInput::Relaunch, out))
    }

    pub fn delete(&mut self, scene: usize, track: usize, out: &mut Outbox) -> Result<(), SessionError> {
        let slot = Self::slot(scene, track)?;
        self.apply(slot, ClipInput::Delete, out);
        Ok(())
    }

    /// Snap all events to the quantize grid. Returns false for a clip without events.
    pub fn quantize(&mut self, scene: usize, track: usize) -> Result<bool, SessionError> {
        let slot = Self::slot(scene, track)?;
        let grid = self.quantize_grid;
        let steps_per_measure = self.steps_per_measure;
        let clip = self.matrix.get_mut(slot);
        if clip.state.is_recording() {
            return Err(SessionError::Recording);
        }
        if !clip.has_events() {
            return Ok(false);
        }
        clip.quantize(grid);
        // A snapped end on the bar line must not leave a partial measure
        clip.round_length_to_measures(1, steps_per_measure);
        if clip.state == ClipState::Playing && clip.playhead_step >= clip.length {
            clip.playhead_step = 0;
        }
        log::info!("Clip {}/{} quantized to {} step(s)", scene, track, grid);
        Ok(true)
    }

    /// Copy events and length into a blank cell. The copy starts stopped.
    pub fn duplicate(
        &mut self,
        src: (usize, usize),
        dst: (usize, usize),
    ) -> Result<(), SessionError> {
        let src_slot = Self::slot(src.0, src.1)?;
        let dst_slot = Self::slot(dst.0, dst.1)?;

        let source = self.matrix.get(src_slot);
        if !source.has_events() || source.state.is_recording() {
            return Err(SessionError::SourceEmpty);
        }
        let target = self.matrix.get(dst_slot);
        if target.state != ClipState::Empty || target.has_events() {
            return Err(SessionError::DestinationNotEmpty);
        }

        let events = source.events.clone();
        let length = source.length;
        let target = self.matrix.get_mut(dst_slot);
        target.events = events;
        target.length = length;
        log::info!(
            "Clip {}/{} duplicated to {}/{}",
            src.0,
            src.1,
            dst.0,
            dst.1
        );
        Ok(())
    }

    /// Place pre-built events into a blank cell as a stopped clip.
    /// The length grows to cover every finalized event and is rounded to whole measures.
    pub fn load_clip(
        &mut self,
        scene: usize,
        track: usize,
        events: Vec<NoteEvent>,
        length: u32,
    ) -> Result<(), SessionError> {
        let slot = Self::slot(scene, track)?;
        let steps_per_measure = self.steps_per_measure;
        let clip = self.matrix.get_mut(slot);
        if clip.state != ClipState::Empty || clip.has_events() {
            return Err(SessionError::DestinationNotEmpty);
        }

        let content = events
            .iter()
            .filter_map(|e| e.end)
            .map(|end| end + 1)
            .max()
            .unwrap_or(0);
        clip.events = events;
        clip.length = length.max(content);
        clip.round_length_to_measures(1, steps_per_measure);
        Ok(())
    }

    /// Feed a live note into the recording clip. Returns whether it was consumed.
    pub fn on_midi_in(&mut self, event: &MidiEvent) -> bool {
        let Some(slot) = self.matrix.recording_slot() else {
            return false;
        };
        let global_step = self.global_step;
        let clip = self.matrix.get_mut(slot);
        let step = u32::try_from(global_step.saturating_sub(clip.record_start_step)).unwrap_or(u32::MAX);

        match *event {
            MidiEvent::NoteOn { note, velocity } if velocity > 0 => {
                clip.record_note_on(note, velocity, step);
                log::debug!("Recorded {} at step {}", midi_note_name(note), step);
                true
            }
            MidiEvent::NoteOn { note, .. } | MidiEvent::NoteOff { note } => {
                let matched = clip.record_note_off(note, step);
                if !matched {
                    log::debug!("Note off {} without open note, ignored", midi_note_name(note));
                }
                matched
            }
            _ => false,
        }
    }

    /// Commit pending transitions on a measure start, then play one step of every playing clip
    pub fn on_step(&mut self, step: &StepEvent, out: &mut Outbox) {
        self.global_step = step.global_step;
        if step.num_steps > 0 {
            self.steps_per_measure = step.num_steps as u32;
        }

        if step.is_measure_start {
            self.measure_index += 1;
            for slot in ClipMatrix::slots() {
                self.apply(slot, ClipInput::RecordBoundary, out);
            }
            for slot in ClipMatrix::slots() {
                self.apply(slot, ClipInput::LaunchBoundary, out);
            }
        }

        self.play_step(out);
    }

    fn play_step(&mut self, out: &mut Outbox) {
        let playing: Vec<ClipSlot> = self
            .matrix
            .iter()
            .filter(|(_, clip)| clip.state == ClipState::Playing)
            .map(|(slot, _)| slot)
            .collect();
        if playing.is_empty() {
            return;
        }

        // Every note-off of this step goes out before any note-on
        for &slot in &playing {
            let Some(instrument) = self.tracks.instrument(slot.track) else {
                continue;
            };
            let clip = self.matrix.get(slot);
            for event in clip
                .finalized_events()
                .filter(|e| e.end == Some(clip.playhead_step))
            {
                out.note_off(instrument, event.note);
            }
        }
        for &slot in &playing {
            let Some(instrument) = self.tracks.instrument(slot.track) else {
                continue;
            };
            let clip = self.matrix.get(slot);
            for event in clip
                .finalized_events()
                .filter(|e| e.start == clip.playhead_step)
            {
                out.note_on(instrument, event.note, event.velocity);
            }
        }

        for slot in playing {
            let clip = self.matrix.get_mut(slot);
            clip.playhead_step += 1;
            if clip.playhead_step >= clip.length {
                self.apply(slot, ClipInput::PlayheadWrapped, out);
            }
        }
    }

    /// Transport stopped: silence every track with a playing clip and rewind
    pub fn on_transport_stop(&mut self, out: &mut Outbox) {
        let mut silenced: Vec<&str> = Vec::new();
        for slot in ClipMatrix::slots() {
            let clip = self.matrix.get_mut(slot);
            if clip.state != ClipState::Playing {
                continue;
            }
            clip.playhead_step = 0;
            if let Some(instrument) = self.tracks.instrument(slot.track) {
                if !silenced.contains(&instrument) {
                    out.all_notes_off(instrument);
                    silenced.push(instrument);
                }
            }
        }
    }

    pub fn snapshot(&self, scene: usize, track: usize) -> Option<ClipSnapshot> {
        let slot = ClipSlot::new(scene, track)?;
        Some(self.snapshot_slot(slot))
    }

    fn snapshot_slot(&self, slot: ClipSlot) -> ClipSnapshot {
        let clip = self.matrix.get(slot);
        ClipSnapshot {
            slot,
            state: clip.state,
            has_events: clip.has_events(),
            stop_after_end: clip.stop_after_end,
            playhead_step: clip.playhead_step,
            length: clip.length,
            color: self.tracks.color(slot.track).map(str::to_string),
        }
    }

    /// All 64 cells, scene-major
    pub fn snapshots(&self) -> Vec<ClipSnapshot> {
        ClipMatrix::slots().map(|slot| self.snapshot_slot(slot)).collect()
    }
}

impl Default for ClipEngine {
    fn default() -> Self {
        Self::new(TrackRegistry::new())
    }
}

impl StepListener for ClipEngine {
    fn on_sequencer_step(&mut self, step: &StepEvent, out: &mut Outbox) {
        self.on_step(step, out);
    }
}
