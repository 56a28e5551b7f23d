// Session - 8x8 clip matrix with quantized recording and launch

pub mod clip;
pub mod engine;
pub mod tracks;
pub mod transition;

pub use clip::{Clip, ClipMatrix, ClipSlot, ClipState, NUM_SCENES, NUM_TRACKS, NoteEvent};
pub use engine::{ClipEngine, ClipSnapshot, SessionError};
pub use tracks::{TrackInfo, TrackRegistry};
