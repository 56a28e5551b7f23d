// Pushstation - Library exports for the runner, tests and benchmarks

pub mod config;
pub mod connection;
pub mod messaging;
pub mod midi;
pub mod sampler;
pub mod sequencer;
pub mod session;
pub mod workstation;

// Re-export commonly used types for convenience
pub use config::{ConfigError, WorkstationConfig};
pub use midi::event::MidiEvent;
pub use midi::router::{MidiError, MidiRouter, MidiSink, PortBinding, PortQuirks};
pub use sequencer::{
    ClockEngine, ClockListener, Outbox, Resolution, StepEvent, StepListener, StepSequencer, Tempo,
};
pub use session::{ClipEngine, ClipState, SessionError};
pub use workstation::Workstation;
