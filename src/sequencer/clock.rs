// Clock engine - free-running 24ppqn pulse thread
//
// Sends MIDI clock to every open output, START on the first pulse after a
// start and STOP when stopped, and calls the listener once per pulse.

use super::timeline::Tempo;
use crate::midi::event::MidiEvent;
use crate::midi::router::MidiRouter;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Below this the thread yields instead of sleeping on the condvar
const SPIN_WINDOW: Duration = Duration::from_micros(500);

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Receives pulses on the clock thread.
///
/// `on_start` runs on the caller's thread before the first pulse, `on_stop` after
/// the last one.
pub trait ClockListener: Send + Sync {
    fn on_pulse(&self);

    fn on_start(&self) {}

    fn on_stop(&self) {}
}

struct ClockShared {
    tempo_bits: AtomicU64,
    clock_factor_bits: AtomicU64,
    running: AtomicBool,
    send_start: AtomicBool,
    pulses: AtomicU64,
    wake: Mutex<()>,
    wake_cond: Condvar,
    /// Instrument whose port never receives START/STOP
    transport_exclude: Mutex<Option<String>>,
}

impl ClockShared {
    fn tempo(&self) -> Tempo {
        Tempo::new(f64::from_bits(self.tempo_bits.load(Ordering::Relaxed)))
    }

    fn clock_factor(&self) -> f64 {
        f64::from_bits(self.clock_factor_bits.load(Ordering::Relaxed))
    }

    fn transport_exclude(&self) -> Option<String> {
        lock(&self.transport_exclude).clone()
    }

    /// Sleep until `deadline` or a stop request. A tempo change does not wake the
    /// loop: the pending deadline stands and the following interval uses the new tempo.
    fn wait_until(&self, deadline: Instant) {
        let guard = lock(&self.wake);
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining > SPIN_WINDOW {
            let _ = self.wake_cond.wait_timeout(guard, remaining - SPIN_WINDOW);
        } else {
            drop(guard);
            thread::yield_now();
        }
    }

    fn notify(&self) {
        let _guard = lock(&self.wake);
        self.wake_cond.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct ClockEngine {
    shared: Arc<ClockShared>,
    router: Arc<MidiRouter>,
    listener: Arc<dyn ClockListener>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ClockEngine {
    pub fn new(tempo: Tempo, router: Arc<MidiRouter>, listener: Arc<dyn ClockListener>) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                tempo_bits: AtomicU64::new(tempo.bpm().to_bits()),
                clock_factor_bits: AtomicU64::new(1.0f64.to_bits()),
                running: AtomicBool::new(false),
                send_start: AtomicBool::new(false),
                pulses: AtomicU64::new(0),
                wake: Mutex::new(()),
                wake_cond: Condvar::new(),
                transport_exclude: Mutex::new(None),
            }),
            router,
            listener,
            thread: Mutex::new(None),
        }
    }

    /// Clamp and store; the next pulse interval is computed from the new value
    pub fn set_tempo(&self, bpm: f64) -> Tempo {
        let tempo = Tempo::new(bpm);
        self.shared
            .tempo_bits
            .store(tempo.bpm().to_bits(), Ordering::Relaxed);
        log::info!("Tempo {}", tempo);
        tempo
    }

    pub fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    /// Pulse-rate multiplier, 1.0 is standard 24ppqn
    pub fn set_clock_factor(&self, factor: f64) {
        let factor = if factor.is_finite() { factor.max(0.0001) } else { 1.0 };
        self.shared
            .clock_factor_bits
            .store(factor.to_bits(), Ordering::Relaxed);
    }

    pub fn clock_factor(&self) -> f64 {
        self.shared.clock_factor()
    }

    /// Keep START/STOP away from the port of this instrument (it gets explicit notes instead)
    pub fn set_transport_exclusion(&self, instrument: Option<String>) {
        *lock(&self.shared.transport_exclude) = instrument;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Pulses generated since creation
    pub fn pulse_count(&self) -> u64 {
        self.shared.pulses.load(Ordering::Relaxed)
    }

    /// Reset the listener, arm START for the next pulse and spawn the pulse
    /// thread if it is not already running.
    pub fn start(&self) -> Result<(), ClockError> {
        let mut handle = lock(&self.thread);

        // Position reset happens before START is armed so the first pulse is step 0
        self.listener.on_start();
        self.shared.send_start.store(true, Ordering::Release);

        if self.shared.running.swap(true, Ordering::AcqRel) && handle.is_some() {
            log::debug!("Clock already running, START re-armed");
            return Ok(());
        }

        if let Some(stale) = handle.take() {
            let _ = stale.join();
        }

        let shared = Arc::clone(&self.shared);
        let router = Arc::clone(&self.router);
        let listener = Arc::clone(&self.listener);
        let spawned = thread::Builder::new()
            .name("midi-clock".to_string())
            .spawn(move || run_pulse_loop(shared, router, listener));

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                log::info!("Clock started at {}", self.tempo());
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(ClockError::Spawn(e))
            }
        }
    }

    /// Halt pulses, send STOP and let the listener release its notes. Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.notify();

        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            // Stopping from inside a pulse: the loop exits on its own
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Clock thread terminated abnormally");
            }
        }

        let exclude = self.shared.transport_exclude();
        self.router
            .broadcast_realtime(MidiEvent::Stop, exclude.as_deref());
        self.listener.on_stop();
        log::info!("Clock stopped");
    }
}

impl Drop for ClockEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_pulse_loop(
    shared: Arc<ClockShared>,
    router: Arc<MidiRouter>,
    listener: Arc<dyn ClockListener>,
) {
    let mut next_pulse = Instant::now();

    while shared.running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_pulse {
            shared.wait_until(next_pulse);
            continue;
        }

        let interval = shared.tempo().pulse_interval(shared.clock_factor());
        // Accumulate so that wake-up latency does not add up over time
        next_pulse += interval;
        if next_pulse + interval < now {
            log::debug!("Clock fell behind by {:?}, resyncing", now - next_pulse);
            next_pulse = now + interval;
        }

        if shared.send_start.swap(false, Ordering::AcqRel) {
            let exclude = shared.transport_exclude();
            router.broadcast_realtime(MidiEvent::Start, exclude.as_deref());
        }
        router.broadcast_realtime(MidiEvent::Clock, None);
        let pulse = shared.pulses.fetch_add(1, Ordering::Relaxed);
        log::trace!("pulse {}", pulse);

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener.on_pulse())) {
            log::error!("Clock listener panicked: {}", panic_message(payload.as_ref()));
        }
    }

    log::debug!("Clock thread exiting");
}
