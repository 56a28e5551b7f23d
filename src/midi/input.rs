// MIDI Input - receives notes from the recording keyboard into the input queue

use crate::messaging::channels::{InputProducer, try_enqueue};
use crate::midi::device::is_blacklisted;
use crate::midi::event::MidiEvent;
use crate::midi::router::MidiError;
use midir::{MidiInput as MidirInput, MidiInputConnection};

/// Open connection feeding the session's input queue.
/// Dropping it closes the port.
pub struct MidiInput {
    port_name: Option<String>,
    _connection: Option<MidiInputConnection<()>>,
}

impl MidiInput {
    /// Connect to `port_name`, or to the first usable input when `None`.
    /// No available port is not an error: recording simply receives nothing.
    pub fn connect(port_name: Option<&str>, mut producer: InputProducer) -> Result<Self, MidiError> {
        let midi_in = MidirInput::new("Pushstation MIDI Input")
            .map_err(|e| MidiError::Init(e.to_string()))?;

        let ports = midi_in.ports();
        let chosen = ports.iter().find_map(|port| {
            let name = midi_in.port_name(port).ok()?;
            let wanted = match port_name {
                Some(wanted) => name == wanted,
                None => !is_blacklisted(&name),
            };
            wanted.then(|| (port.clone(), name))
        });

        let (port, name) = match (chosen, port_name) {
            (Some(found), _) => found,
            (None, Some(wanted)) => return Err(MidiError::PortNotFound(wanted.to_string())),
            (None, None) => {
                log::warn!("No MIDI input detected. Recording will receive nothing.");
                return Ok(Self::disconnected());
            }
        };

        let connection = midi_in
            .connect(
                &port,
                "pushstation-input",
                move |_timestamp, message, _| {
                    // Runs on the backend's callback thread: parse, filter, enqueue, nothing else
                    if let Some(event) = MidiEvent::from_bytes(message) {
                        if event.is_realtime() {
                            return;
                        }
                        if !try_enqueue(&mut producer, event) {
                            log::warn!("MIDI input queue full, event dropped");
                        }
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        log::info!("Connected to MIDI input: {}", name);

        Ok(Self {
            port_name: Some(name),
            _connection: Some(connection),
        })
    }

    pub fn disconnected() -> Self {
        Self {
            port_name: None,
            _connection: None,
        }
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self._connection.is_some()
    }
}
