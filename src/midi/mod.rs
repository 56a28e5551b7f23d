// MIDI - wire messages, port discovery, recording input and output routing

pub mod device;
pub mod event;
pub mod input;
pub mod router;

pub use event::{MidiEvent, PPQN, midi_note_name};
pub use router::{MidiError, MidiRouter, MidiSink, PortBinding, PortQuirks};
