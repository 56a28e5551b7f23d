// MIDI device discovery

use midir::{MidiInput as MidirInput, MidiOutput as MidirOutput};

/// Port names never offered for routing (controller surfaces and loopbacks)
const BLACKLIST: [&str; 3] = ["Ableton Push", "RtMidi", "Through"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AvailablePorts {
    pub inputs: Vec<MidiDeviceInfo>,
    pub outputs: Vec<MidiDeviceInfo>,
}

pub struct MidiDeviceManager;

impl MidiDeviceManager {
    pub fn new() -> Self {
        Self
    }

    /// Scan every input and output port the system currently exposes
    pub fn scan(&self) -> AvailablePorts {
        AvailablePorts {
            inputs: self.list_input_ports(),
            outputs: self.list_output_ports(),
        }
    }

    pub fn list_input_ports(&self) -> Vec<MidiDeviceInfo> {
        match MidirInput::new("Pushstation MIDI Scanner") {
            Ok(midi_in) => {
                let names = midi_in
                    .ports()
                    .iter()
                    .filter_map(|p| midi_in.port_name(p).ok())
                    .collect();
                describe("midi_in", names)
            }
            Err(e) => {
                log::warn!("Could not scan MIDI inputs: {}", e);
                Vec::new()
            }
        }
    }

    pub fn list_output_ports(&self) -> Vec<MidiDeviceInfo> {
        match MidirOutput::new("Pushstation MIDI Scanner") {
            Ok(midi_out) => {
                let names = midi_out
                    .ports()
                    .iter()
                    .filter_map(|p| midi_out.port_name(p).ok())
                    .collect();
                describe("midi_out", names)
            }
            Err(e) => {
                log::warn!("Could not scan MIDI outputs: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for MidiDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_blacklisted(name: &str) -> bool {
    BLACKLIST.iter().any(|b| name.contains(b))
}

fn describe(prefix: &str, names: Vec<String>) -> Vec<MidiDeviceInfo> {
    names
        .into_iter()
        .filter(|name| !is_blacklisted(name))
        .enumerate()
        .map(|(index, name)| MidiDeviceInfo {
            id: format!("{}_{}", prefix, index),
            name,
            // First usable port is the default
            is_default: index == 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklisted_ports_are_hidden() {
        let ports = describe(
            "midi_out",
            vec![
                "Ableton Push 2 Live Port".to_string(),
                "Pro 800".to_string(),
                "Midi Through Port-0".to_string(),
                "Digitakt".to_string(),
            ],
        );

        let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Pro 800", "Digitakt"]);
        assert!(ports[0].is_default);
        assert!(!ports[1].is_default);
        assert_eq!(ports[1].id, "midi_out_1");
    }
}
