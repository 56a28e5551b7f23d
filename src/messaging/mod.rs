// Lock-free queues between the MIDI input callback and the session engine

pub mod channels;

pub use channels::{InputConsumer, InputProducer, create_input_channel};
