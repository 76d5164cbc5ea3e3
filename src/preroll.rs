//! Pre-roll
//!
//! A newly configured stage is fed silent blocks before it joins live
//! signal flow, so units that only settle their latency and tail after
//! consuming audio report steady-state values from the start.

use tracing::debug;

use crate::engine::{AudioBuffer, MidiBuffer};
use crate::stage::{ProcessingPrecision, Stage, StageSample};

/// Minimum number of frames pushed through a stage during pre-roll
pub const PRE_ROLL_SAMPLES: usize = 16384;

/// Feed silent `block_size` blocks of `channels` channels until at least
/// `min_samples` frames went through the stage
///
/// Returns the number of frames pushed. At least one block is always
/// processed; a zero block size processes nothing.
pub fn pre_roll<T: StageSample>(
    stage: &mut dyn Stage,
    channels: usize,
    block_size: usize,
    min_samples: usize,
) -> usize {
    if block_size == 0 {
        return 0;
    }
    let mut buffer = AudioBuffer::<T>::new(channels, block_size);
    let mut midi = MidiBuffer::new();
    let mut processed = 0;
    loop {
        T::process_stage(stage, &mut buffer, &mut midi);
        processed += block_size;
        if processed >= min_samples {
            break;
        }
        // Units may write into the block; every pass starts from silence.
        buffer.clear();
        midi.clear();
    }
    processed
}

/// Pre-roll with blocks matching the stage's processing precision
pub fn pre_roll_stage(
    stage: &mut dyn Stage,
    channels: usize,
    block_size: usize,
    min_samples: usize,
) -> usize {
    let processed = match stage.processing_precision() {
        ProcessingPrecision::Double => pre_roll::<f64>(stage, channels, block_size, min_samples),
        ProcessingPrecision::Single => pre_roll::<f32>(stage, channels, block_size, min_samples),
    };
    debug!(
        "pre-rolled {} with {} frames over {} channel(s)",
        stage.name(),
        processed,
        channels
    );
    processed
}
