// Communication channels lock-free

use crate::midi::event::MidiEvent;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

pub type InputProducer = ringbuf::HeapProd<MidiEvent>;
pub type InputConsumer = ringbuf::HeapCons<MidiEvent>;

/// Bounded single-producer/single-consumer queue for incoming MIDI.
/// The producer side lives in the port callback, the consumer is drained by the session.
pub fn create_input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let rb = HeapRb::<MidiEvent>::new(capacity.max(1));
    rb.split()
}

/// Non-blocking push; returns false when the queue is full and the event was dropped
pub fn try_enqueue(producer: &mut InputProducer, event: MidiEvent) -> bool {
    producer.try_push(event).is_ok()
}

/// Pop everything currently queued, in arrival order
pub fn drain(consumer: &mut InputConsumer) -> Vec<MidiEvent> {
    let mut events = Vec::new();
    while let Some(event) = consumer.try_pop() {
        events.push(event);
    }
    events
}
