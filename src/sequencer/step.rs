// Step sequencer - turns 24ppqn clock pulses into discrete steps and plays the drum grid

use super::grid::{NUM_PADS, NUM_STEPS, StepGrid};
use super::outbox::Outbox;
use super::timeline::Resolution;
use std::time::{Duration, Instant};

/// Emitted once per step, synchronously on the clock thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    /// Column of the step grid, in `[0, num_steps)`
    pub current_step: usize,
    /// True exactly when `current_step == 0`
    pub is_measure_start: bool,
    pub num_steps: usize,
    /// Monotonic step count, never reset by resolution changes or transport restarts
    pub global_step: u64,
}

/// Anything that follows the sequencer step by step (clip engine, UI feedback)
pub trait StepListener: Send {
    fn on_sequencer_step(&mut self, step: &StepEvent, out: &mut Outbox);
}

/// Where and how the drum grid is played
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumOutput {
    /// Logical instrument receiving the grid notes; nothing is played when unset
    pub instrument: Option<String>,
    /// Note of pad 0, pad N plays `start_note + N`
    pub start_note: u8,
    pub velocity: u8,
    /// Fixed gate length; the grid encodes onsets only
    pub note_length: Duration,
}

impl Default for DrumOutput {
    fn default() -> Self {
        Self {
            instrument: None,
            start_note: 36,
            velocity: 100,
            note_length: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingNoteOff {
    due: Instant,
    instrument: String,
    note: u8,
}

/// Read-only view for renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerSnapshot {
    pub current_step: Option<usize>,
    pub selected_pad: usize,
    pub resolution: Resolution,
    pub selected_row: [bool; NUM_STEPS],
}

pub struct StepSequencer {
    grid: StepGrid,
    /// None before the first step after a start (the "-1" position)
    current_step: Option<usize>,
    resolution: Resolution,
    /// Pulses since the last step
    tick_counter: u32,
    global_step: u64,
    selected_pad: usize,
    output: DrumOutput,
    pending_offs: Vec<PendingNoteOff>,
}

impl StepSequencer {
    pub fn new(resolution: Resolution, output: DrumOutput) -> Self {
        Self {
            grid: StepGrid::new(),
            current_step: None,
            resolution,
            tick_counter: 0,
            global_step: 0,
            selected_pad: 0,
            output,
            pending_offs: Vec::new(),
        }
    }

    pub fn grid(&self) -> &StepGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut StepGrid {
        &mut self.grid
    }

    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn output(&self) -> &DrumOutput {
        &self.output
    }

    pub fn set_output(&mut self, output: DrumOutput) {
        self.output = output;
    }

    pub fn selected_pad(&self) -> usize {
        self.selected_pad
    }

    pub fn pending_note_offs(&self) -> usize {
        self.pending_offs.len()
    }

    /// Advance by one clock pulse
    pub fn tick(&mut self, out: &mut Outbox) -> Option<StepEvent> {
        self.tick_at(Instant::now(), out)
    }

    /// Advance by one clock pulse observed at `now`.
    ///
    /// The first pulse after a start plays step 0 immediately; afterwards a step
    /// fires every `ticks_per_step` pulses. Expired drum note-offs are flushed
    /// before any new note-on.
    pub fn tick_at(&mut self, now: Instant, out: &mut Outbox) -> Option<StepEvent> {
        self.flush_due_note_offs(now, out);

        let fire = match self.current_step {
            None => true,
            Some(_) => {
                self.tick_counter += 1;
                self.tick_counter >= self.resolution.ticks_per_step()
            }
        };
        if !fire {
            return None;
        }
        self.tick_counter = 0;

        let next_step = match self.current_step {
            None => 0,
            Some(step) => (step + 1) % NUM_STEPS,
        };
        self.current_step = Some(next_step);
        self.global_step += 1;

        self.play_column(next_step, now, out);
        log::trace!("step {} (global {})", next_step, self.global_step);

        Some(StepEvent {
            current_step: next_step,
            is_measure_start: next_step == 0,
            num_steps: NUM_STEPS,
            global_step: self.global_step,
        })
    }

    fn play_column(&mut self, step: usize, now: Instant, out: &mut Outbox) {
        let Some(instrument) = self.output.instrument.clone() else {
            return;
        };

        let pads: Vec<usize> = self.grid.active_pads(step).collect();
        for pad in pads {
            let note = self.output.start_note.saturating_add(pad as u8).min(127);

            // Retrigger: release a still-held copy of this note first
            if let Some(index) = self
                .pending_offs
                .iter()
                .position(|p| p.note == note && p.instrument == instrument)
            {
                let pending = self.pending_offs.swap_remove(index);
                out.note_off(&pending.instrument, pending.note);
            }

            out.note_on(&instrument, note, self.output.velocity);
            self.pending_offs.push(PendingNoteOff {
                due: now + self.output.note_length,
                instrument: instrument.clone(),
                note,
            });
        }
    }

    fn flush_due_note_offs(&mut self, now: Instant, out: &mut Outbox) {
        if self.pending_offs.is_empty() {
            return;
        }
        let mut still_pending = Vec::with_capacity(self.pending_offs.len());
        for pending in self.pending_offs.drain(..) {
            if pending.due <= now {
                out.note_off(&pending.instrument, pending.note);
            } else {
                still_pending.push(pending);
            }
        }
        self.pending_offs = still_pending;
    }

    /// Change steps per beat. Only 1, 2, 4 and 8 are accepted; anything else is ignored.
    pub fn set_resolution(&mut self, steps_per_beat: u8) -> bool {
        match Resolution::from_steps_per_beat(steps_per_beat) {
            Some(resolution) => {
                self.set_resolution_mode(resolution);
                true
            }
            None => {
                log::warn!("Ignoring invalid resolution: {} steps per beat", steps_per_beat);
                false
            }
        }
    }

    /// Resets the pulse counter so the first step at the new resolution has full length
    pub fn set_resolution_mode(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        self.tick_counter = 0;
        log::info!("Sequencer resolution {}", resolution);
    }

    /// Flip one step; invalid indices are ignored
    pub fn toggle_step(&mut self, pad: usize, step: usize) -> Option<bool> {
        self.grid.toggle(pad, step)
    }

    pub fn toggle_selected_step(&mut self, step: usize) -> Option<bool> {
        self.grid.toggle(self.selected_pad, step)
    }

    pub fn select_pad(&mut self, pad: usize) -> bool {
        if pad < NUM_PADS {
            self.selected_pad = pad;
            true
        } else {
            false
        }
    }

    /// Back to the "not started" position; the next pulse plays step 0
    pub fn reset_position(&mut self) {
        self.current_step = None;
        self.tick_counter = 0;
    }

    /// Transport stopped: rewind and release every drum note still waiting for its note-off
    pub fn stop(&mut self, out: &mut Outbox) {
        self.reset_position();
        for pending in self.pending_offs.drain(..) {
            out.note_off(&pending.instrument, pending.note);
        }
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            current_step: self.current_step,
            selected_pad: self.selected_pad,
            resolution: self.resolution,
            selected_row: self
                .grid
                .row(self.selected_pad)
                .copied()
                .unwrap_or([false; NUM_STEPS]),
        }
    }
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new(Resolution::default(), DrumOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::MidiEvent;
    use crate::sequencer::outbox::OutMessage;

    fn drum_sequencer(resolution: Resolution) -> StepSequencer {
        StepSequencer::new(
            resolution,
            DrumOutput {
                instrument: Some("drums".to_string()),
                ..DrumOutput::default()
            },
        )
    }

    fn run_ticks(seq: &mut StepSequencer, count: usize) -> Vec<StepEvent> {
        let now = Instant::now();
        let mut out = Outbox::new();
        (0..count).filter_map(|_| seq.tick_at(now, &mut out)).collect()
    }

    #[test]
    fn test_first_pulse_plays_step_zero() {
        let mut seq = drum_sequencer(Resolution::Sixteenth);
        assert_eq!(seq.current_step(), None);

        let events = run_ticks(&mut seq, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].current_step, 0);
        assert!(events[0].is_measure_start);
        assert_eq!(events[0].num_steps, 32);
    }

    #[test]
    fn test_one_step_per_ticks_per_step() {
        for resolution in Resolution::ALL {
            let mut seq = drum_sequencer(resolution);
            run_ticks(&mut seq, 1);
            let tps = resolution.ticks_per_step() as usize;

            // One pulse short of a step: nothing
            assert!(run_ticks(&mut seq, tps - 1).is_empty());
            // The next pulse: exactly one step
            let events = run_ticks(&mut seq, 1);
            assert_eq!(events.len(), 1, "resolution {}", resolution);
            assert_eq!(seq.current_step(), Some(1));
        }
    }

    #[test]
    fn test_wraparound_after_32_steps() {
        let mut seq = drum_sequencer(Resolution::ThirtySecond);
        let events = run_ticks(&mut seq, 1 + 32 * 3);
        assert_eq!(events.len(), 33);
        assert_eq!(events[32].current_step, 0);

        let starts: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_measure_start)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(starts, vec![0, 32]);
    }

    #[test]
    fn test_global_step_is_monotonic_across_restart() {
        let mut seq = drum_sequencer(Resolution::Quarter);
        run_ticks(&mut seq, 25);
        assert_eq!(seq.global_step(), 2);

        let mut out = Outbox::new();
        seq.stop(&mut out);
        let events = run_ticks(&mut seq, 1);
        assert_eq!(events[0].current_step, 0);
        assert_eq!(events[0].global_step, 3);
    }

    #[test]
    fn test_resolution_change_resets_sub_counter() {
        let mut seq = drum_sequencer(Resolution::Quarter);
        run_ticks(&mut seq, 1 + 20);
        assert!(seq.set_resolution(8));
        // Full 3 pulses at 1/32 after the change, not 24 - 20
        assert!(run_ticks(&mut seq, 2).is_empty());
        assert_eq!(run_ticks(&mut seq, 1).len(), 1);
    }

    #[test]
    fn test_invalid_resolution_ignored() {
        let mut seq = drum_sequencer(Resolution::Sixteenth);
        assert!(!seq.set_resolution(3));
        assert!(!seq.set_resolution(0));
        assert_eq!(seq.resolution(), Resolution::Sixteenth);
    }

    #[test]
    fn test_grid_column_plays_with_fixed_length() {
        let mut seq = drum_sequencer(Resolution::Sixteenth);
        seq.toggle_step(0, 0);
        seq.toggle_step(2, 0);

        let start = Instant::now();
        let mut out = Outbox::new();
        seq.tick_at(start, &mut out);
        assert_eq!(
            out.take(),
            vec![
                OutMessage::Event {
                    instrument: "drums".to_string(),
                    event: MidiEvent::NoteOn { note: 36, velocity: 100 }
                },
                OutMessage::Event {
                    instrument: "drums".to_string(),
                    event: MidiEvent::NoteOn { note: 38, velocity: 100 }
                },
            ]
        );
        assert_eq!(seq.pending_note_offs(), 2);

        // Not yet due
        seq.tick_at(start + Duration::from_millis(50), &mut out);
        assert!(out.is_empty());

        seq.tick_at(start + Duration::from_millis(100), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(seq.pending_note_offs(), 0);
    }

    #[test]
    fn test_stop_sweeps_pending_note_offs() {
        let mut seq = drum_sequencer(Resolution::Sixteenth);
        seq.toggle_step(1, 0);
        let mut out = Outbox::new();
        seq.tick_at(Instant::now(), &mut out);
        out.take();

        seq.stop(&mut out);
        assert_eq!(
            out.take(),
            vec![OutMessage::Event {
                instrument: "drums".to_string(),
                event: MidiEvent::NoteOff { note: 37 }
            }]
        );
        assert_eq!(seq.current_step(), None);
    }

    #[test]
    fn test_retrigger_releases_previous_note_first() {
        let mut seq = StepSequencer::new(
            Resolution::ThirtySecond,
            DrumOutput {
                instrument: Some("drums".to_string()),
                note_length: Duration::from_secs(10),
                ..DrumOutput::default()
            },
        );
        seq.toggle_step(0, 0);
        seq.toggle_step(0, 1);

        let now = Instant::now();
        let mut out = Outbox::new();
        for _ in 0..4 {
            seq.tick_at(now, &mut out);
        }
        let events: Vec<_> = out
            .take()
            .into_iter()
            .map(|m| match m {
                OutMessage::Event { event, .. } => event,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            events,
            vec![
                MidiEvent::NoteOn { note: 36, velocity: 100 },
                MidiEvent::NoteOff { note: 36 },
                MidiEvent::NoteOn { note: 36, velocity: 100 },
            ]
        );
    }

    #[test]
    fn test_no_instrument_plays_nothing_but_still_steps() {
        let mut seq = StepSequencer::default();
        seq.toggle_step(0, 0);
        let mut out = Outbox::new();
        assert!(seq.tick_at(Instant::now(), &mut out).is_some());
        assert!(out.is_empty());
    }

    #[test]
    fn test_selected_pad_toggle() {
        let mut seq = StepSequencer::default();
        assert!(seq.select_pad(4));
        assert!(!seq.select_pad(16));
        assert_eq!(seq.toggle_selected_step(9), Some(true));
        assert!(seq.grid().get(4, 9));
        assert!(seq.snapshot().selected_row[9]);
    }
}
