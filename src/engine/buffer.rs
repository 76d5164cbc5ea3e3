//! Interleaved Audio Buffer
//!
//! Blocks routed through the chain are interleaved: `[c0, c1, .., cN, c0, c1, ..]`.
//! The channel count covers the main input bus followed by the sidechain bus,
//! plus any extra channels a stage needs beyond the chain's nominal I/O.

use std::fmt::Debug;
use std::ops::Range;

use num_traits::Float;

use crate::error::{ChainError, Result};

// ============================================================================
// Sample Type
// ============================================================================

/// Floating point sample type a block can carry (f32 or f64)
pub trait Sample: Float + Default + Debug + Send + Sync + 'static {}

impl Sample for f32 {}
impl Sample for f64 {}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Interleaved multichannel audio block
///
/// # Example
/// ```
/// use fxchain::engine::AudioBuffer;
///
/// let mut block = AudioBuffer::<f32>::new(2, 64);
/// block.set(0, 1, 0.5);
/// assert_eq!(block.get(0, 1), Some(0.5));
/// assert_eq!(block.samples().len(), 128);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer<T: Sample = f32> {
    samples: Vec<T>,
    num_channels: usize,
}

impl<T: Sample> AudioBuffer<T> {
    /// Create a silent buffer with `num_channels` x `num_frames` samples
    pub fn new(num_channels: usize, num_frames: usize) -> Self {
        Self {
            samples: vec![T::zero(); num_channels * num_frames],
            num_channels,
        }
    }

    /// Create a buffer from existing interleaved samples
    pub fn from_interleaved(samples: Vec<T>, num_channels: usize) -> Result<Self> {
        if num_channels == 0 && !samples.is_empty() {
            return Err(ChainError::InvalidConfig {
                reason: "interleaved data without channels".to_string(),
            });
        }
        if num_channels > 0 && samples.len() % num_channels != 0 {
            return Err(ChainError::InvalidConfig {
                reason: format!(
                    "sample count {} is not divisible by channel count {}",
                    samples.len(),
                    num_channels
                ),
            });
        }
        Ok(Self {
            samples,
            num_channels,
        })
    }

    /// Number of interleaved channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of frames (samples per channel)
    #[inline]
    pub fn num_frames(&self) -> usize {
        if self.num_channels == 0 {
            0
        } else {
            self.samples.len() / self.num_channels
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All interleaved samples
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    /// All interleaved samples, mutable
    pub fn samples_mut(&mut self) -> &mut [T] {
        &mut self.samples
    }

    /// Get the sample at `frame` on `channel`
    pub fn get(&self, frame: usize, channel: usize) -> Option<T> {
        if channel < self.num_channels && frame < self.num_frames() {
            Some(self.samples[frame * self.num_channels + channel])
        } else {
            None
        }
    }

    /// Set the sample at `frame` on `channel`; out of range writes are ignored
    pub fn set(&mut self, frame: usize, channel: usize, value: T) -> bool {
        if channel < self.num_channels && frame < self.num_frames() {
            self.samples[frame * self.num_channels + channel] = value;
            true
        } else {
            false
        }
    }

    /// Fill every sample with `value`
    pub fn fill(&mut self, value: T) {
        self.samples.iter_mut().for_each(|s| *s = value);
    }

    /// Zero the whole buffer
    pub fn clear(&mut self) {
        self.fill(T::zero());
    }

    /// Zero a contiguous range of channels in every frame
    ///
    /// The range is clipped to the buffer's channel count.
    pub fn clear_channels(&mut self, channels: Range<usize>) {
        let start = channels.start.min(self.num_channels);
        let end = channels.end.min(self.num_channels);
        if start >= end {
            return;
        }
        for frame in self.samples.chunks_exact_mut(self.num_channels) {
            frame[start..end].iter_mut().for_each(|s| *s = T::zero());
        }
    }

    /// Iterate over one channel's samples
    pub fn channel_iter(&self, channel: usize) -> impl Iterator<Item = T> + '_ {
        let step = self.num_channels.max(1);
        let skip = if channel < self.num_channels {
            channel
        } else {
            self.samples.len()
        };
        self.samples.iter().skip(skip).step_by(step).copied()
    }

    /// Absolute peak of one channel
    pub fn peak(&self, channel: usize) -> T {
        self.channel_iter(channel)
            .map(Float::abs)
            .fold(T::zero(), Float::max)
    }

    /// True when every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == T::zero())
    }
}

impl<T: Sample> Default for AudioBuffer<T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

// ============================================================================
// Tests
// ============================================================================
