// Clip transitions - pure (state, input) -> (state, effects) table
//
// Nothing here touches time, MIDI or other clips. The engine applies the
// returned effects and enforces the rules that span the whole matrix.

use super::clip::ClipState;

/// What happened to a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipInput {
    /// Pad pressed
    Press,
    /// Pad pressed with the relaunch modifier held
    Relaunch,
    /// Measure start, first pass: record start/stop
    RecordBoundary,
    /// Measure start, second pass: queued clips begin playing
    LaunchBoundary,
    /// The playhead reached the end of the loop
    PlayheadWrapped,
    Delete,
}

/// Side effects the engine must carry out, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Clear events and remember the current global step and measure
    BeginRecording,
    /// Drop notes still held and round the length up to whole measures
    FinishRecording,
    ResetPlayhead,
    /// All-notes-off on the clip's track
    AllNotesOff,
    ClearEvents,
}

/// The parts of a clip a transition depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipView {
    pub state: ClipState,
    pub has_events: bool,
    pub stop_after_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ClipState,
    pub stop_after_end: bool,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(state: ClipState) -> Self {
        Self {
            state,
            stop_after_end: false,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn unchanged(view: ClipView) -> Self {
        Self {
            state: view.state,
            stop_after_end: view.stop_after_end,
            effects: Vec::new(),
        }
    }

    pub fn changes(&self, view: ClipView) -> bool {
        self.state != view.state || self.stop_after_end != view.stop_after_end || !self.effects.is_empty()
    }
}

pub fn transition(view: ClipView, input: ClipInput) -> Transition {
    use ClipState::*;

    match (input, view.state) {
        (ClipInput::Delete, Playing) => Transition::to(Empty)
            .with(Effect::AllNotesOff)
            .with(Effect::ClearEvents),
        (ClipInput::Delete, _) => Transition::to(Empty).with(Effect::ClearEvents),

        (ClipInput::Press, Empty) if view.has_events => Transition::to(Queued),
        (ClipInput::Press, Empty) => Transition::to(QueuedRecord),
        // Cancel before anything was recorded
        (ClipInput::Press, QueuedRecord) => Transition::to(Empty),
        (ClipInput::Press, Recording) => Transition::to(WaitEndRecord),
        (ClipInput::Press, WaitEndRecord) => Transition::unchanged(view),
        // Hard stop: nothing to wait for
        (ClipInput::Press, Queued) => Transition::to(Empty).with(Effect::AllNotesOff),
        (ClipInput::Press, Playing) if view.stop_after_end => {
            Transition::to(Empty).with(Effect::AllNotesOff)
        }
        (ClipInput::Press, Playing) => Transition {
            state: Playing,
            stop_after_end: true,
            effects: Vec::new(),
        },

        (ClipInput::Relaunch, Playing) => Transition::to(Queued).with(Effect::AllNotesOff),
        (ClipInput::Relaunch, Empty) if view.has_events => Transition::to(Queued),
        (ClipInput::Relaunch, _) => Transition::unchanged(view),

        (ClipInput::RecordBoundary, QueuedRecord) => {
            Transition::to(Recording).with(Effect::BeginRecording)
        }
        (ClipInput::RecordBoundary, WaitEndRecord) => {
            Transition::to(Queued)
                .with(Effect::FinishRecording)
                .with(Effect::AllNotesOff)
        }
        (ClipInput::RecordBoundary, _) => Transition::unchanged(view),

        (ClipInput::LaunchBoundary, Queued) => {
            Transition::to(Playing).with(Effect::ResetPlayhead)
        }
        (ClipInput::LaunchBoundary, _) => Transition::unchanged(view),

        (ClipInput::PlayheadWrapped, Playing) if view.stop_after_end => {
            Transition::to(Empty).with(Effect::AllNotesOff)
        }
        (ClipInput::PlayheadWrapped, Playing) => {
            Transition::to(Playing).with(Effect::ResetPlayhead)
        }
        (ClipInput::PlayheadWrapped, _) => Transition::unchanged(view),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClipState::*;

    fn view(state: ClipState, has_events: bool, stop_after_end: bool) -> ClipView {
        ClipView {
            state,
            has_events,
            stop_after_end,
        }
    }

    #[test]
    fn test_record_cycle() {
        let t = transition(view(Empty, false, false), ClipInput::Press);
        assert_eq!(t.state, QueuedRecord);

        let t = transition(view(QueuedRecord, false, false), ClipInput::RecordBoundary);
        assert_eq!(t.state, Recording);
        assert_eq!(t.effects, vec![Effect::BeginRecording]);

        let t = transition(view(Recording, true, false), ClipInput::Press);
        assert_eq!(t.state, WaitEndRecord);

        let t = transition(view(WaitEndRecord, true, false), ClipInput::RecordBoundary);
        assert_eq!(t.state, Queued);
        assert_eq!(t.effects, vec![Effect::FinishRecording, Effect::AllNotesOff]);

        let t = transition(view(Queued, true, false), ClipInput::LaunchBoundary);
        assert_eq!(t.state, Playing);
        assert_eq!(t.effects, vec![Effect::ResetPlayhead]);
    }

    #[test]
    fn test_pending_states_ignore_wrong_boundary() {
        let queued = view(Queued, true, false);
        assert!(!transition(queued, ClipInput::RecordBoundary).changes(queued));

        let queued_record = view(QueuedRecord, false, false);
        assert!(!transition(queued_record, ClipInput::LaunchBoundary).changes(queued_record));
    }

    #[test]
    fn test_stop_after_end() {
        let t = transition(view(Playing, true, false), ClipInput::Press);
        assert_eq!(t.state, Playing);
        assert!(t.stop_after_end);
        assert!(t.effects.is_empty());

        let t = transition(view(Playing, true, true), ClipInput::PlayheadWrapped);
        assert_eq!(t.state, Empty);
        assert!(!t.stop_after_end);
        assert_eq!(t.effects, vec![Effect::AllNotesOff]);
    }

    #[test]
    fn test_wrap_without_flag_loops() {
        let t = transition(view(Playing, true, false), ClipInput::PlayheadWrapped);
        assert_eq!(t.state, Playing);
        assert_eq!(t.effects, vec![Effect::ResetPlayhead]);
    }

    #[test]
    fn test_second_press_hard_stops() {
        let t = transition(view(Playing, true, true), ClipInput::Press);
        assert_eq!(t.state, Empty);
        assert_eq!(t.effects, vec![Effect::AllNotesOff]);

        let t = transition(view(Queued, true, false), ClipInput::Press);
        assert_eq!(t.state, Empty);
        assert_eq!(t.effects, vec![Effect::AllNotesOff]);
    }

    #[test]
    fn test_stopped_clip_relaunches_on_press() {
        let t = transition(view(Empty, true, false), ClipInput::Press);
        assert_eq!(t.state, Queued);
    }

    #[test]
    fn test_relaunch() {
        let t = transition(view(Playing, true, true), ClipInput::Relaunch);
        assert_eq!(t.state, Queued);
        assert!(!t.stop_after_end);

        let idle = view(Empty, false, false);
        assert!(!transition(idle, ClipInput::Relaunch).changes(idle));
    }

    #[test]
    fn test_delete_from_any_state() {
        for state in [Empty, QueuedRecord, Recording, WaitEndRecord, Queued, Playing] {
            let t = transition(view(state, true, true), ClipInput::Delete);
            assert_eq!(t.state, Empty);
            assert!(!t.stop_after_end);
            assert_eq!(t.effects.last(), Some(&Effect::ClearEvents));
        }
    }

    #[test]
    fn test_wait_end_record_press_is_noop() {
        let v = view(WaitEndRecord, true, false);
        assert!(!transition(v, ClipInput::Press).changes(v));
    }
}
