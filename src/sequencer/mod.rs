// Sequencer module
// Master clock, tempo/resolution, the 16x32 drum grid and its step sequencer

pub mod clock;
pub mod grid;
pub mod outbox;
pub mod rhythmic;
pub mod step;
pub mod timeline;

pub use clock::{ClockEngine, ClockError, ClockListener};
pub use grid::{NUM_PADS, NUM_STEPS, StepGrid};
pub use outbox::{OutMessage, Outbox};
pub use rhythmic::{RhythmicAction, RhythmicPadMap, handle_rhythmic_input};
pub use step::{DrumOutput, SequencerSnapshot, StepEvent, StepListener, StepSequencer};
pub use timeline::{Resolution, Tempo};
