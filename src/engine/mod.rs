//! Audio Engine Module
//!
//! Block-level data the chain routes through its stages:
//! - Interleaved audio buffers (f32 or f64)
//! - Per-block MIDI events

pub mod buffer;
pub mod midi;

pub use buffer::{AudioBuffer, Sample};
pub use midi::{MidiBuffer, MidiEvent};
