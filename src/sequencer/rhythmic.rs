// Rhythmic pad input - maps controller pad pitches to pad selection or step toggles

use super::grid::{NUM_PADS, NUM_STEPS};
use super::step::StepSequencer;

/// First pitch of the pad-select block; pads 0..16 use 36..=51
const PAD_SELECT_BASE: u8 = 36;

/// Controller pitches of the step buttons, four rows of eight, top row first
const STEP_ROWS: [[u8; 8]; 4] = [
    [64, 65, 66, 67, 96, 97, 98, 99],
    [60, 61, 62, 63, 92, 93, 94, 95],
    [56, 57, 58, 59, 88, 89, 90, 91],
    [52, 53, 54, 55, 84, 85, 86, 87],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhythmicAction {
    SelectPad(usize),
    ToggleStep(usize),
    /// Note-off, or a pitch with no meaning in this mode
    Ignored,
    Unmapped(u8),
}

/// Pitch lookup for the rhythmic layout
#[derive(Debug, Clone)]
pub struct RhythmicPadMap {
    pad_of_pitch: [Option<u8>; 128],
    step_of_pitch: [Option<u8>; 128],
}

impl RhythmicPadMap {
    pub fn new() -> Self {
        let mut pad_of_pitch = [None; 128];
        for pad in 0..NUM_PADS as u8 {
            pad_of_pitch[(PAD_SELECT_BASE + pad) as usize] = Some(pad);
        }

        let mut step_of_pitch = [None; 128];
        for (row, pitches) in STEP_ROWS.iter().enumerate() {
            for (col, &pitch) in pitches.iter().enumerate() {
                step_of_pitch[pitch as usize] = Some((row * 8 + col) as u8);
            }
        }

        Self {
            pad_of_pitch,
            step_of_pitch,
        }
    }

    /// Pad selection takes precedence over step toggles
    pub fn resolve(&self, pitch: u8, is_note_on: bool) -> RhythmicAction {
        if !is_note_on {
            return RhythmicAction::Ignored;
        }
        let index = pitch as usize;
        if let Some(pad) = self.pad_of_pitch.get(index).copied().flatten() {
            return RhythmicAction::SelectPad(pad as usize);
        }
        match self.step_of_pitch.get(index).copied().flatten() {
            Some(step) if (step as usize) < NUM_STEPS => RhythmicAction::ToggleStep(step as usize),
            _ => RhythmicAction::Unmapped(pitch),
        }
    }

    /// Pitch that toggles `step`, for lighting the right button
    pub fn pitch_for_step(&self, step: usize) -> Option<u8> {
        STEP_ROWS.get(step / 8).and_then(|row| row.get(step % 8)).copied()
    }
}

impl Default for RhythmicPadMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one pad hit to the sequencer and report what it did
pub fn handle_rhythmic_input(
    map: &RhythmicPadMap,
    sequencer: &mut StepSequencer,
    pitch: u8,
    is_note_on: bool,
) -> RhythmicAction {
    let action = map.resolve(pitch, is_note_on);
    match action {
        RhythmicAction::SelectPad(pad) => {
            sequencer.select_pad(pad);
            log::debug!("Selected pad {}", pad);
        }
        RhythmicAction::ToggleStep(step) => {
            if let Some(on) = sequencer.toggle_selected_step(step) {
                log::debug!("Pad {} step {} -> {}", sequencer.selected_pad(), step, on);
            }
        }
        RhythmicAction::Unmapped(pitch) => log::debug!("No rhythmic action for pitch {}", pitch),
        RhythmicAction::Ignored => {}
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_select_range() {
        let map = RhythmicPadMap::new();
        assert_eq!(map.resolve(36, true), RhythmicAction::SelectPad(0));
        assert_eq!(map.resolve(51, true), RhythmicAction::SelectPad(15));
        assert_eq!(map.resolve(35, true), RhythmicAction::Unmapped(35));
    }

    #[test]
    fn test_step_rows() {
        let map = RhythmicPadMap::new();
        assert_eq!(map.resolve(64, true), RhythmicAction::ToggleStep(0));
        assert_eq!(map.resolve(99, true), RhythmicAction::ToggleStep(7));
        assert_eq!(map.resolve(60, true), RhythmicAction::ToggleStep(8));
        assert_eq!(map.resolve(87, true), RhythmicAction::ToggleStep(31));
        assert_eq!(map.pitch_for_step(31), Some(87));
        assert_eq!(map.pitch_for_step(32), None);
    }

    #[test]
    fn test_every_step_reachable_once() {
        let map = RhythmicPadMap::new();
        let mut steps: Vec<usize> = (0..=127u8)
            .filter_map(|p| match map.resolve(p, true) {
                RhythmicAction::ToggleStep(s) => Some(s),
                _ => None,
            })
            .collect();
        steps.sort_unstable();
        assert_eq!(steps, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_note_off_ignored() {
        let map = RhythmicPadMap::new();
        let mut seq = StepSequencer::default();
        assert_eq!(handle_rhythmic_input(&map, &mut seq, 64, false), RhythmicAction::Ignored);
        assert!(!seq.grid().get(0, 0));
    }

    #[test]
    fn test_select_then_toggle() {
        let map = RhythmicPadMap::new();
        let mut seq = StepSequencer::default();
        handle_rhythmic_input(&map, &mut seq, 38, true);
        handle_rhythmic_input(&map, &mut seq, 61, true);
        assert!(seq.grid().get(2, 9));

        handle_rhythmic_input(&map, &mut seq, 61, true);
        assert!(!seq.grid().get(2, 9));
    }
}
