// MIDI event types - parsing and encoding of standard MIDI byte messages

/// Pulses per quarter note of the MIDI realtime clock
pub const PPQN: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    /// 14-bit value, 8192 = centre
    PitchBend { value: i16 },
    ChannelPressure { value: u8 },
    PolyPressure { note: u8, value: u8 },
    Clock,
    Start,
    Continue,
    Stop,
}

/// MIDI event addressed to a channel (0-15) for transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    pub event: MidiEvent,
    pub channel: u8,
}

impl MidiEvent {
    /// Controller number of the "All Notes Off" channel mode message
    pub const ALL_NOTES_OFF_CC: u8 = 123;

    /// Parse a raw MIDI message
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }

        let status = bytes[0];

        // Realtime messages are a single status byte
        match status {
            0xF8 => return Some(MidiEvent::Clock),
            0xFA => return Some(MidiEvent::Start),
            0xFB => return Some(MidiEvent::Continue),
            0xFC => return Some(MidiEvent::Stop),
            _ => {}
        }

        let message_type = status & 0xF0;

        match message_type {
            0x90 => {
                if bytes.len() >= 3 {
                    let note = bytes[1];
                    let velocity = bytes[2];
                    // Velocity 0 = Note Off
                    if velocity == 0 {
                        Some(MidiEvent::NoteOff { note })
                    } else {
                        Some(MidiEvent::NoteOn { note, velocity })
                    }
                } else {
                    None
                }
            }
            0x80 => {
                if bytes.len() >= 3 {
                    Some(MidiEvent::NoteOff { note: bytes[1] })
                } else {
                    None
                }
            }
            0xA0 => {
                if bytes.len() >= 3 {
                    Some(MidiEvent::PolyPressure {
                        note: bytes[1],
                        value: bytes[2],
                    })
                } else {
                    None
                }
            }
            0xB0 => {
                if bytes.len() >= 3 {
                    Some(MidiEvent::ControlChange {
                        controller: bytes[1],
                        value: bytes[2],
                    })
                } else {
                    None
                }
            }
            0xC0 => {
                if bytes.len() >= 2 {
                    Some(MidiEvent::ProgramChange { program: bytes[1] })
                } else {
                    None
                }
            }
            0xD0 => {
                if bytes.len() >= 2 {
                    Some(MidiEvent::ChannelPressure { value: bytes[1] })
                } else {
                    None
                }
            }
            0xE0 => {
                if bytes.len() >= 3 {
                    let lsb = (bytes[1] & 0x7F) as i16;
                    let msb = (bytes[2] & 0x7F) as i16;
                    let value = (msb << 7) | lsb;
                    Some(MidiEvent::PitchBend { value })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Encode to raw bytes on the given channel.
    /// Data bytes are masked to 7 bits; the channel is ignored for realtime messages.
    pub fn to_bytes(&self, channel: u8) -> Vec<u8> {
        let ch = channel & 0x0F;
        match *self {
            MidiEvent::NoteOn { note, velocity } => vec![0x90 | ch, note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { note } => vec![0x80 | ch, note & 0x7F, 0],
            MidiEvent::ControlChange { controller, value } => {
                vec![0xB0 | ch, controller & 0x7F, value & 0x7F]
            }
            MidiEvent::ProgramChange { program } => vec![0xC0 | ch, program & 0x7F],
            MidiEvent::PitchBend { value } => {
                let value = value.clamp(0, 0x3FFF) as u16;
                vec![0xE0 | ch, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
            }
            MidiEvent::ChannelPressure { value } => vec![0xD0 | ch, value & 0x7F],
            MidiEvent::PolyPressure { note, value } => vec![0xA0 | ch, note & 0x7F, value & 0x7F],
            MidiEvent::Clock => vec![0xF8],
            MidiEvent::Start => vec![0xFA],
            MidiEvent::Continue => vec![0xFB],
            MidiEvent::Stop => vec![0xFC],
        }
    }

    /// Transport messages (start/continue/stop), which some outputs must not receive
    pub fn is_transport(&self) -> bool {
        matches!(self, MidiEvent::Start | MidiEvent::Continue | MidiEvent::Stop)
    }

    pub fn is_realtime(&self) -> bool {
        self.is_transport() || matches!(self, MidiEvent::Clock)
    }

    /// Note number for note on/off, None otherwise
    pub fn note(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { note, .. } | MidiEvent::NoteOff { note } => Some(note),
            _ => None,
        }
    }

    pub fn on_channel(self, channel: u8) -> ChannelEvent {
        ChannelEvent {
            event: self,
            channel: channel & 0x0F,
        }
    }
}

impl ChannelEvent {
    /// Wire bytes with the channel in the status nibble
    pub fn to_bytes(&self) -> Vec<u8> {
        self.event.to_bytes(self.channel)
    }
}

/// Note name such as "C4" or "A#5" (60 = C4)
pub fn midi_note_name(note: u8) -> String {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on() {
        let bytes = [0x90, 60, 100];
        let event = MidiEvent::from_bytes(&bytes).unwrap();

        match event {
            MidiEvent::NoteOn { note, velocity } => {
                assert_eq!(note, 60);
                assert_eq!(velocity, 100);
            }
            _ => panic!("Expected NoteOn event"),
        }
    }

    #[test]
    fn test_note_off_explicit() {
        let event = MidiEvent::from_bytes(&[0x80, 60, 0]).unwrap();
        assert_eq!(event, MidiEvent::NoteOff { note: 60 });
    }

    #[test]
    fn test_note_off_velocity_zero() {
        // Note On with velocity 0 is a Note Off
        let event = MidiEvent::from_bytes(&[0x90, 64, 0]).unwrap();
        assert_eq!(event, MidiEvent::NoteOff { note: 64 });
    }

    #[test]
    fn test_control_change() {
        let event = MidiEvent::from_bytes(&[0xB0, 7, 127]).unwrap();
        assert_eq!(
            event,
            MidiEvent::ControlChange {
                controller: 7,
                value: 127
            }
        );
    }

    #[test]
    fn test_program_change_two_bytes() {
        let event = MidiEvent::from_bytes(&[0xC3, 12]).unwrap();
        assert_eq!(event, MidiEvent::ProgramChange { program: 12 });
    }

    #[test]
    fn test_pitch_bend() {
        let event = MidiEvent::from_bytes(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(event, MidiEvent::PitchBend { value: 8192 });
    }

    #[test]
    fn test_realtime_messages() {
        assert_eq!(MidiEvent::from_bytes(&[0xF8]), Some(MidiEvent::Clock));
        assert_eq!(MidiEvent::from_bytes(&[0xFA]), Some(MidiEvent::Start));
        assert_eq!(MidiEvent::from_bytes(&[0xFB]), Some(MidiEvent::Continue));
        assert_eq!(MidiEvent::from_bytes(&[0xFC]), Some(MidiEvent::Stop));
    }

    #[test]
    fn test_invalid_empty_message() {
        let bytes = [];
        assert!(MidiEvent::from_bytes(&bytes).is_none());
    }

    #[test]
    fn test_invalid_incomplete_message() {
        assert!(MidiEvent::from_bytes(&[0x90, 60]).is_none());
    }

    #[test]
    fn test_invalid_unknown_status() {
        assert!(MidiEvent::from_bytes(&[0xF0, 0x00, 0x00]).is_none());
    }

    #[test]
    fn test_midi_channel_ignored() {
        let event1 = MidiEvent::from_bytes(&[0x90, 60, 100]).unwrap();
        let event2 = MidiEvent::from_bytes(&[0x9F, 60, 100]).unwrap();
        assert_eq!(event1, event2);
    }

    #[test]
    fn test_encode_channel_messages() {
        assert_eq!(
            MidiEvent::NoteOn {
                note: 60,
                velocity: 100
            }
            .to_bytes(0),
            vec![0x90, 60, 100]
        );
        assert_eq!(MidiEvent::NoteOff { note: 60 }.to_bytes(9), vec![0x89, 60, 0]);
        assert_eq!(
            MidiEvent::ControlChange {
                controller: MidiEvent::ALL_NOTES_OFF_CC,
                value: 0
            }
            .to_bytes(1),
            vec![0xB1, 123, 0]
        );
        assert_eq!(MidiEvent::PitchBend { value: 8192 }.to_bytes(0), vec![0xE0, 0x00, 0x40]);
    }

    #[test]
    fn test_encode_realtime_ignores_channel() {
        assert_eq!(MidiEvent::Clock.to_bytes(5), vec![0xF8]);
        assert_eq!(MidiEvent::Start.to_bytes(5), vec![0xFA]);
        assert_eq!(MidiEvent::Stop.to_bytes(5), vec![0xFC]);
    }

    #[test]
    fn test_transport_classification() {
        assert!(MidiEvent::Start.is_transport());
        assert!(MidiEvent::Stop.is_transport());
        assert!(!MidiEvent::Clock.is_transport());
        assert!(MidiEvent::Clock.is_realtime());
        assert!(!MidiEvent::NoteOff { note: 1 }.is_realtime());
    }

    #[test]
    fn test_note_name() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(73), "C#5");
    }
}
