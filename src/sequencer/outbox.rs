// Outbox - messages produced while the engine lock is held, sent after it is released

use crate::midi::event::MidiEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutMessage {
    /// A single message addressed to a logical instrument
    Event { instrument: String, event: MidiEvent },
    /// Release every note on an instrument
    AllNotesOff { instrument: String },
}

impl OutMessage {
    pub fn instrument(&self) -> &str {
        match self {
            OutMessage::Event { instrument, .. } | OutMessage::AllNotesOff { instrument } => {
                instrument
            }
        }
    }
}

/// Ordered buffer of outgoing messages. Order of insertion is order of transmission.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OutMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_on(&mut self, instrument: &str, note: u8, velocity: u8) {
        self.push(instrument, MidiEvent::NoteOn { note, velocity });
    }

    pub fn note_off(&mut self, instrument: &str, note: u8) {
        self.push(instrument, MidiEvent::NoteOff { note });
    }

    pub fn push(&mut self, instrument: &str, event: MidiEvent) {
        self.messages.push(OutMessage::Event {
            instrument: instrument.to_string(),
            event,
        });
    }

    pub fn all_notes_off(&mut self, instrument: &str) {
        self.messages.push(OutMessage::AllNotesOff {
            instrument: instrument.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[OutMessage] {
        &self.messages
    }

    pub fn take(&mut self) -> Vec<OutMessage> {
        std::mem::take(&mut self.messages)
    }
}
