// MIDI router - owns every opened output port and maps logical instruments onto them
//
// Ports are opened once and shared: several instruments may be bound to the same
// physical output. All sends go through the router by instrument name, never by port.

use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::midi::event::MidiEvent;
use midir::{MidiOutput, MidiOutputConnection};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const CLIENT_NAME: &str = "Pushstation MIDI Output";

/// Settle time after the second START of a double-start output
const DOUBLE_START_SETTLE: Duration = Duration::from_millis(2);

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("No output port bound to instrument '{0}'")]
    PortMissing(String),

    #[error("MIDI initialisation failed: {0}")]
    Init(String),

    #[error("MIDI port '{0}' not found")]
    PortNotFound(String),

    #[error("Failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },

    #[error("Failed to send to '{port}': {reason}")]
    Send { port: String, reason: String },
}

/// Anything bytes can be written to. Implemented for midir connections and for
/// in-memory sinks in tests.
pub trait MidiSink: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String>;
}

impl MidiSink for MidiOutputConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String> {
        MidiOutputConnection::send(self, bytes).map_err(|e| e.to_string())
    }
}

/// Protocol quirks of a particular output device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortQuirks {
    /// Send START twice separated by this gap (some synths miss the first one)
    pub double_start_gap: Option<Duration>,
}

/// Result of looking up an instrument's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortBinding {
    Bound(String),
    Missing,
}

impl PortBinding {
    pub fn is_bound(&self) -> bool {
        matches!(self, PortBinding::Bound(_))
    }

    pub fn port_name(&self) -> Option<&str> {
        match self {
            PortBinding::Bound(name) => Some(name),
            PortBinding::Missing => None,
        }
    }
}

struct OutputPort {
    sink: Box<dyn MidiSink>,
    quirks: PortQuirks,
    status: AtomicDeviceStatus,
}

impl OutputPort {
    fn write(&mut self, port_name: &str, bytes: &[u8]) -> Result<(), MidiError> {
        match self.sink.send(bytes) {
            Ok(()) => {
                if self.status.set(DeviceStatus::Connected) == DeviceStatus::Error {
                    log::info!("MIDI port '{}' recovered", port_name);
                }
                Ok(())
            }
            Err(reason) => {
                self.status.set(DeviceStatus::Error);
                Err(MidiError::Send {
                    port: port_name.to_string(),
                    reason,
                })
            }
        }
    }
}

/// Where an instrument's messages go
#[derive(Debug, Clone)]
struct Route {
    port: String,
    channel: u8,
}

#[derive(Default)]
struct RouterInner {
    ports: BTreeMap<String, OutputPort>,
    /// Keyed by normalized instrument name
    bindings: HashMap<String, Route>,
}

/// Registry of opened outputs and instrument bindings.
/// Shared by reference (`Arc`) between the clock thread and the control thread.
pub struct MidiRouter {
    inner: Mutex<RouterInner>,
}

impl MidiRouter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RouterInner::default()),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a system output by name, reusing it if already open
    pub fn open_output(&self, port_name: &str, quirks: PortQuirks) -> Result<(), MidiError> {
        if self.inner().ports.contains_key(port_name) {
            log::debug!("Reusing already open OUT port '{}'", port_name);
            return Ok(());
        }

        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name == port_name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| MidiError::PortNotFound(port_name.to_string()))?;

        let connection = midi_out
            .connect(port, "pushstation-out")
            .map_err(|e| MidiError::Connect {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        log::info!("Opened OUT port '{}'", port_name);
        self.attach_sink(port_name, Box::new(connection), quirks);
        Ok(())
    }

    /// Register an already-connected sink under a port name (replaces any previous one)
    pub fn attach_sink(&self, port_name: &str, sink: Box<dyn MidiSink>, quirks: PortQuirks) {
        self.inner().ports.insert(
            port_name.to_string(),
            OutputPort {
                sink,
                quirks,
                status: AtomicDeviceStatus::new(DeviceStatus::Connected),
            },
        );
    }

    /// Bind a logical instrument to an output port name on channel 0.
    /// The port does not have to be open.
    pub fn bind_instrument(&self, instrument: &str, port_name: &str) {
        self.bind_instrument_on_channel(instrument, port_name, 0);
    }

    /// Bind an instrument whose channel messages use `channel` (0-15)
    pub fn bind_instrument_on_channel(&self, instrument: &str, port_name: &str, channel: u8) {
        self.inner().bindings.insert(
            normalize(instrument),
            Route {
                port: port_name.to_string(),
                channel: channel & 0x0F,
            },
        );
        log::info!(
            "Instrument '{}' -> OUT '{}' ch {}",
            instrument,
            port_name,
            (channel & 0x0F) + 1
        );
    }

    /// Which port an instrument currently addresses. Names match case-insensitively;
    /// an instrument bound to a port that failed to open is reported as missing.
    pub fn get_bound_output(&self, instrument: &str) -> PortBinding {
        let inner = self.inner();
        match inner.bindings.get(&normalize(instrument)) {
            Some(route) if inner.ports.contains_key(&route.port) => {
                PortBinding::Bound(route.port.clone())
            }
            _ => PortBinding::Missing,
        }
    }

    pub fn port_status(&self, port_name: &str) -> DeviceStatus {
        self.inner()
            .ports
            .get(port_name)
            .map(|p| p.status.get())
            .unwrap_or(DeviceStatus::Disconnected)
    }

    pub fn open_ports(&self) -> Vec<String> {
        self.inner().ports.keys().cloned().collect()
    }

    /// Send one message to whatever port the instrument is bound to
    pub fn send(&self, instrument: &str, event: MidiEvent) -> Result<(), MidiError> {
        let mut inner = self.inner();
        let route = inner
            .bindings
            .get(&normalize(instrument))
            .cloned()
            .ok_or_else(|| MidiError::PortMissing(instrument.to_string()))?;
        let port = inner
            .ports
            .get_mut(&route.port)
            .ok_or_else(|| MidiError::PortMissing(instrument.to_string()))?;
        port.write(&route.port, &event.on_channel(route.channel).to_bytes())
    }

    pub fn send_note_on(&self, instrument: &str, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.send(instrument, MidiEvent::NoteOn { note, velocity })
    }

    pub fn send_note_off(&self, instrument: &str, note: u8) -> Result<(), MidiError> {
        self.send(instrument, MidiEvent::NoteOff { note })
    }

    pub fn send_cc(&self, instrument: &str, controller: u8, value: u8) -> Result<(), MidiError> {
        self.send(instrument, MidiEvent::ControlChange { controller, value })
    }

    pub fn send_program_change(&self, instrument: &str, program: u8) -> Result<(), MidiError> {
        self.send(instrument, MidiEvent::ProgramChange { program })
    }

    pub fn send_pitch_bend(&self, instrument: &str, value: i16) -> Result<(), MidiError> {
        self.send(instrument, MidiEvent::PitchBend { value })
    }

    pub fn send_aftertouch(&self, instrument: &str, value: u8) -> Result<(), MidiError> {
        self.send(instrument, MidiEvent::ChannelPressure { value })
    }

    /// Note-off on all 128 notes followed by CC 123.
    /// Stops at the first failure since the port is then unusable for this burst.
    pub fn send_all_notes_off(&self, instrument: &str) -> Result<(), MidiError> {
        for note in 0..=127u8 {
            self.send(instrument, MidiEvent::NoteOff { note })?;
        }
        self.send(
            instrument,
            MidiEvent::ControlChange {
                controller: MidiEvent::ALL_NOTES_OFF_CC,
                value: 0,
            },
        )
    }

    /// Fan a realtime message out to every open port once.
    ///
    /// Transport messages (start/stop) skip the port bound to `exclude_instrument`,
    /// which receives explicit notes instead. A failing port is logged and does not
    /// prevent delivery to the others.
    ///
    /// The repeated START of double-start ports is sent after the gap with the
    /// registry unlocked, so other senders are not held up meanwhile.
    pub fn broadcast_realtime(&self, event: MidiEvent, exclude_instrument: Option<&str>) {
        let bytes = event.to_bytes(0);
        let excluded_port = match exclude_instrument.map(|i| self.get_bound_output(i)) {
            Some(PortBinding::Bound(port)) if event.is_transport() => Some(port),
            _ => None,
        };

        let mut repeats: Vec<(String, Duration)> = Vec::new();
        {
            let mut inner = self.inner();
            for (port_name, port) in inner.ports.iter_mut() {
                if excluded_port.as_deref() == Some(port_name.as_str()) {
                    continue;
                }
                match port.write(port_name, &bytes) {
                    Ok(()) => {
                        if let (MidiEvent::Start, Some(gap)) = (event, port.quirks.double_start_gap) {
                            repeats.push((port_name.clone(), gap));
                        }
                    }
                    Err(e) => log::warn!("Could not send {:?}: {}", event, e),
                }
            }
        }

        if repeats.is_empty() {
            return;
        }
        repeats.sort_by_key(|(_, gap)| *gap);
        let first_sent = Instant::now();
        for (port_name, gap) in repeats {
            if let Some(wait) = (first_sent + gap).checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            let mut inner = self.inner();
            if let Some(port) = inner.ports.get_mut(&port_name) {
                if let Err(e) = port.write(&port_name, &bytes) {
                    log::warn!("Could not repeat {:?}: {}", event, e);
                }
            }
        }
        thread::sleep(DOUBLE_START_SETTLE);
    }
}

impl Default for MidiRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
