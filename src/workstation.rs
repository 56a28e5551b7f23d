// Workstation - wires clock, step sequencer, clip engine and router together
//
// Sequencer and session state live behind one coarse mutex. Everything the
// clock thread, the control thread and the input queue do to them happens
// under that lock; MIDI is sent only after it is released.

use crate::config::WorkstationConfig;
use crate::messaging::channels::{InputConsumer, InputProducer, create_input_channel, drain};
use crate::midi::event::MidiEvent;
use crate::midi::input::MidiInput;
use crate::midi::router::{MidiError, MidiRouter};
use crate::sequencer::clock::{ClockEngine, ClockError, ClockListener, panic_message};
use crate::sequencer::outbox::{OutMessage, Outbox};
use crate::sequencer::rhythmic::{RhythmicAction, RhythmicPadMap, handle_rhythmic_input};
use crate::sequencer::step::{SequencerSnapshot, StepEvent, StepListener, StepSequencer};
use crate::sequencer::timeline::{Resolution, Tempo};
use crate::session::clip::ClipState;
use crate::session::engine::{ClipEngine, ClipSnapshot, SessionError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Everything mutated by more than one thread
pub struct CoreState {
    pub sequencer: StepSequencer,
    pub session: ClipEngine,
    pub pad_map: RhythmicPadMap,
    listeners: Vec<Box<dyn StepListener>>,
}

impl CoreState {
    fn new(config: &WorkstationConfig) -> Self {
        Self {
            sequencer: StepSequencer::new(config.resolution(), config.sequencer.drum_output()),
            session: ClipEngine::new(config.track_registry()),
            pad_map: RhythmicPadMap::new(),
            listeners: Vec::new(),
        }
    }

    /// One clock pulse: step the sequencer, notify step listeners, then feed queued input
    fn pulse(&mut self, now: Instant, input: Vec<MidiEvent>, out: &mut Outbox) {
        if let Some(step) = self.sequencer.tick_at(now, out) {
            self.notify_step(&step, out);
        }

        for event in input {
            if !self.session.on_midi_in(&event) {
                log::trace!("Input {:?} not recorded", event);
            }
        }
    }

    fn notify_step(&mut self, step: &StepEvent, out: &mut Outbox) {
        let session = &mut self.session;
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| session.on_sequencer_step(step, out)))
        {
            log::error!("Clip engine failed on step {}: {}", step.current_step, panic_message(payload.as_ref()));
        }

        for listener in &mut self.listeners {
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(|| listener.on_sequencer_step(step, out)))
            {
                log::error!("Step listener failed on step {}: {}", step.current_step, panic_message(payload.as_ref()));
            }
        }
    }
}

struct Core {
    state: Mutex<CoreState>,
    input: Mutex<InputConsumer>,
    router: Arc<MidiRouter>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Core {
    /// Run `f` under the state lock, then send whatever it produced
    fn with_state<R>(&self, f: impl FnOnce(&mut CoreState, &mut Outbox) -> R) -> R {
        let mut out = Outbox::new();
        let result = {
            let mut state = lock(&self.state);
            f(&mut state, &mut out)
        };
        self.flush(out.take());
        result
    }

    fn flush(&self, messages: Vec<OutMessage>) {
        for message in messages {
            let result = match &message {
                OutMessage::Event { instrument, event } => self.router.send(instrument, *event),
                OutMessage::AllNotesOff { instrument } => self.router.send_all_notes_off(instrument),
            };
            match result {
                Ok(()) => {}
                Err(MidiError::PortMissing(instrument)) => {
                    log::debug!("Dropped message for unbound instrument '{}'", instrument)
                }
                Err(e) => log::warn!("{}", e),
            }
        }
    }
}

impl ClockListener for Core {
    fn on_pulse(&self) {
        let now = Instant::now();
        self.with_state(|state, out| {
            let input = drain(&mut lock(&self.input));
            state.pulse(now, input, out);
        });
    }

    fn on_start(&self) {
        lock(&self.state).sequencer.reset_position();
    }

    fn on_stop(&self) {
        self.with_state(|state, out| {
            state.sequencer.stop(out);
            state.session.on_transport_stop(out);
        });
    }
}

pub struct Workstation {
    core: Arc<Core>,
    clock: ClockEngine,
    producer: Mutex<Option<InputProducer>>,
    input: Mutex<Option<MidiInput>>,
}

impl Workstation {
    /// Open every configured output, then build the workstation around them.
    /// Ports that fail to open are logged and their instruments stay silent.
    pub fn from_config(config: &WorkstationConfig) -> Self {
        let router = Arc::new(MidiRouter::new());
        for instrument in &config.instruments {
            let Some(port) = &instrument.output_port else {
                continue;
            };
            if let Err(e) = router.open_output(port, instrument.quirks.to_quirks()) {
                log::warn!("Instrument '{}': {}", instrument.name, e);
            }
        }
        Self::with_router(config, router)
    }

    /// Build on a router whose ports are already attached. Instruments are bound
    /// from the configuration.
    pub fn with_router(config: &WorkstationConfig, router: Arc<MidiRouter>) -> Self {
        for instrument in &config.instruments {
            if let Some(port) = &instrument.output_port {
                router.bind_instrument_on_channel(&instrument.name, port, instrument.channel);
            }
        }
        if let Some(drums) = &config.sequencer.output_instrument {
            if !router.get_bound_output(drums).is_bound() {
                log::warn!("Sequencer output '{}' has no open port, the grid will be silent", drums);
            }
        }

        let (producer, consumer) = create_input_channel(config.input_queue_capacity);
        let core = Arc::new(Core {
            state: Mutex::new(CoreState::new(config)),
            input: Mutex::new(consumer),
            router: Arc::clone(&router),
        });

        let clock = ClockEngine::new(
            config.tempo(),
            router,
            Arc::clone(&core) as Arc<dyn ClockListener>,
        );
        clock.set_clock_factor(config.clock_factor);
        clock.set_transport_exclusion(config.sequencer.output_instrument.clone());

        Self {
            core,
            clock,
            producer: Mutex::new(Some(producer)),
            input: Mutex::new(None),
        }
    }

    pub fn router(&self) -> &Arc<MidiRouter> {
        &self.core.router
    }

    /// Connect the recording keyboard to the input queue
    pub fn connect_input(&self, port_name: Option<&str>) -> Result<(), MidiError> {
        let Some(producer) = self.take_input_producer() else {
            return Err(MidiError::Init("input queue already connected".to_string()));
        };
        let input = MidiInput::connect(port_name, producer)?;
        *lock(&self.input) = Some(input);
        Ok(())
    }

    /// The producer end of the input queue, for feeding events from elsewhere.
    /// Available once.
    pub fn take_input_producer(&self) -> Option<InputProducer> {
        lock(&self.producer).take()
    }

    pub fn input_port(&self) -> Option<String> {
        lock(&self.input)
            .as_ref()
            .and_then(|i| i.port_name().map(str::to_string))
    }

    pub fn start(&self) -> Result<(), ClockError> {
        self.clock.start()
    }

    pub fn stop(&self) {
        self.clock.stop();
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Drive one pulse by hand, as the clock thread would
    pub fn pulse(&self) {
        self.core.on_pulse();
    }

    pub fn set_tempo(&self, bpm: f64) -> Tempo {
        self.clock.set_tempo(bpm)
    }

    pub fn tempo(&self) -> Tempo {
        self.clock.tempo()
    }

    pub fn set_clock_factor(&self, factor: f64) {
        self.clock.set_clock_factor(factor);
    }

    pub fn set_resolution(&self, steps_per_beat: u8) -> bool {
        self.core
            .with_state(|state, _| state.sequencer.set_resolution(steps_per_beat))
    }

    pub fn resolution(&self) -> Resolution {
        lock(&self.core.state).sequencer.resolution()
    }

    pub fn toggle_step(&self, pad: usize, step: usize) -> Option<bool> {
        self.core
            .with_state(|state, _| state.sequencer.toggle_step(pad, step))
    }

    pub fn handle_rhythmic_input(&self, pitch: u8, is_note_on: bool) -> RhythmicAction {
        self.core.with_state(|state, _| {
            let CoreState {
                sequencer, pad_map, ..
            } = state;
            handle_rhythmic_input(pad_map, sequencer, pitch, is_note_on)
        })
    }

    pub fn press_pad(&self, scene: usize, track: usize) -> Result<ClipState, SessionError> {
        self.core
            .with_state(|state, out| state.session.press_pad(scene, track, out))
    }

    pub fn relaunch_clip(&self, scene: usize, track: usize) -> Result<ClipState, SessionError> {
        self.core
            .with_state(|state, out| state.session.relaunch(scene, track, out))
    }

    pub fn delete_clip(&self, scene: usize, track: usize) -> Result<(), SessionError> {
        self.core
            .with_state(|state, out| state.session.delete(scene, track, out))
    }

    pub fn quantize_clip(&self, scene: usize, track: usize) -> Result<bool, SessionError> {
        self.core
            .with_state(|state, _| state.session.quantize(scene, track))
    }

    pub fn duplicate_clip(
        &self,
        src: (usize, usize),
        dst: (usize, usize),
    ) -> Result<(), SessionError> {
        self.core
            .with_state(|state, _| state.session.duplicate(src, dst))
    }

    /// Feed one event straight into the recording clip, bypassing the queue
    pub fn on_midi_in(&self, event: &MidiEvent) -> bool {
        self.core.with_state(|state, _| state.session.on_midi_in(event))
    }

    pub fn add_step_listener(&self, listener: Box<dyn StepListener>) {
        lock(&self.core.state).listeners.push(listener);
    }

    pub fn sequencer_snapshot(&self) -> SequencerSnapshot {
        lock(&self.core.state).sequencer.snapshot()
    }

    pub fn clip_snapshots(&self) -> Vec<ClipSnapshot> {
        lock(&self.core.state).session.snapshots()
    }

    /// Direct access to the shared state under its lock; messages produced are sent afterwards
    pub fn with_state<R>(&self, f: impl FnOnce(&mut CoreState, &mut Outbox) -> R) -> R {
        self.core.with_state(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::midi::router::PortQuirks;
    use crate::midi::router::test_support::CaptureSink;
    use crate::session::tracks::TrackInfo;

    fn config() -> WorkstationConfig {
        let mut config = WorkstationConfig::default();
        config.instruments = vec![
            InstrumentConfig {
                name: "drums".to_string(),
                output_port: Some("Drum Out".to_string()),
                channel: 0,
                quirks: Default::default(),
            },
            InstrumentConfig {
                name: "keys".to_string(),
                output_port: Some("Keys Out".to_string()),
                channel: 0,
                quirks: Default::default(),
            },
        ];
        config.sequencer.output_instrument = Some("drums".to_string());
        config.tracks = vec![TrackInfo::new("keys")];
        config
    }

    fn workstation() -> (Workstation, CaptureSink, CaptureSink) {
        let drums = CaptureSink::default();
        let keys = CaptureSink::default();
        let router = Arc::new(MidiRouter::new());
        router.attach_sink("Drum Out", Box::new(drums.clone()), PortQuirks::default());
        router.attach_sink("Keys Out", Box::new(keys.clone()), PortQuirks::default());
        (Workstation::with_router(&config(), router), drums, keys)
    }

    struct Counter(Arc<Mutex<Vec<usize>>>);

    impl StepListener for Counter {
        fn on_sequencer_step(&mut self, step: &StepEvent, _out: &mut Outbox) {
            self.0.lock().unwrap().push(step.current_step);
        }
    }

    struct Faulty;

    impl StepListener for Faulty {
        fn on_sequencer_step(&mut self, _step: &StepEvent, _out: &mut Outbox) {
            panic!("broken listener");
        }
    }

    #[test]
    fn test_manual_pulses_play_grid() {
        let (ws, drums, _keys) = workstation();
        ws.toggle_step(0, 0);
        ws.pulse();
        assert_eq!(drums.messages(), vec![vec![0x90, 36, 100]]);
    }

    #[test]
    fn test_step_listeners_survive_a_panicking_neighbour() {
        let (ws, _drums, _keys) = workstation();
        let seen = Arc::new(Mutex::new(Vec::new()));
        ws.add_step_listener(Box::new(Faulty));
        ws.add_step_listener(Box::new(Counter(seen.clone())));

        for _ in 0..(1 + 6 * 2) {
            ws.pulse();
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_queued_input_is_recorded() {
        let (ws, _drums, _keys) = workstation();
        let mut producer = ws.take_input_producer().unwrap();
        assert!(ws.take_input_producer().is_none());

        ws.press_pad(0, 0).unwrap();
        ws.pulse();
        assert_eq!(ws.clip_snapshots()[0].state, ClipState::Recording);

        crate::messaging::channels::try_enqueue(&mut producer, MidiEvent::NoteOn { note: 64, velocity: 70 });
        ws.pulse();
        assert!(ws.clip_snapshots()[0].has_events);
    }

    #[test]
    fn test_clip_notes_use_the_track_instrument_channel() {
        let keys = CaptureSink::default();
        let router = Arc::new(MidiRouter::new());
        router.attach_sink("Keys Out", Box::new(keys.clone()), PortQuirks::default());
        let mut config = config();
        config.instruments[1].channel = 2;
        let ws = Workstation::with_router(&config, router);

        ws.with_state(|state, _| {
            let note = crate::session::clip::NoteEvent { note: 60, velocity: 90, start: 0, end: Some(1) };
            state.session.load_clip(0, 0, vec![note], 32).unwrap();
        });
        ws.press_pad(0, 0).unwrap();
        for _ in 0..(1 + 6) {
            ws.pulse();
        }
        assert_eq!(keys.messages(), vec![vec![0x92, 60, 90], vec![0x82, 60, 0]]);
    }

    #[test]
    fn test_stop_without_start_is_quiet() {
        let (ws, drums, keys) = workstation();
        ws.stop();
        assert!(drums.messages().is_empty());
        assert!(keys.messages().is_empty());
    }

    #[test]
    fn test_rhythmic_input_toggles_selected_pad() {
        let (ws, _drums, _keys) = workstation();
        assert_eq!(ws.handle_rhythmic_input(37, true), RhythmicAction::SelectPad(1));
        assert_eq!(ws.handle_rhythmic_input(65, true), RhythmicAction::ToggleStep(1));
        let snapshot = ws.sequencer_snapshot();
        assert_eq!(snapshot.selected_pad, 1);
        assert!(snapshot.selected_row[1]);
    }
}
