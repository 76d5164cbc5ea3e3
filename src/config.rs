//! Chain configuration
//!
//! Processing session parameters, loadable from and savable to JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};
use crate::layout::BusesLayout;
use crate::preroll::PRE_ROLL_SAMPLES;
use crate::stage::ProcessingPrecision;

/// Default session sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Default block size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Processing session settings for a [`Chain`](crate::Chain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    pub channels_in: usize,
    pub channels_out: usize,
    pub channels_sidechain: usize,
    /// Host processes in double precision when every stage allows it
    pub double_precision: bool,
    /// Frames pushed through a new stage before it goes live; never below
    /// [`PRE_ROLL_SAMPLES`]
    pub pre_roll_samples: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            channels_in: 2,
            channels_out: 2,
            channels_sidechain: 0,
            double_precision: false,
            pre_roll_samples: PRE_ROLL_SAMPLES,
        }
    }
}

impl ChainConfig {
    pub fn with_channels(mut self, channels_in: usize, channels_out: usize, sidechain: usize) -> Self {
        self.channels_in = channels_in;
        self.channels_out = channels_out;
        self.channels_sidechain = sidechain;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_double_precision(mut self, enabled: bool) -> Self {
        self.double_precision = enabled;
        self
    }

    /// Parse from a JSON string and validate
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ChainConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Write as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(invalid(format!("sample rate must be positive, got {}", self.sample_rate)));
        }
        if self.block_size == 0 {
            return Err(invalid("block size must be positive".to_string()));
        }
        if self.pre_roll_samples < PRE_ROLL_SAMPLES {
            return Err(invalid(format!(
                "pre-roll must cover at least {} samples, got {}",
                PRE_ROLL_SAMPLES, self.pre_roll_samples
            )));
        }
        if self.channels_in == 0 && self.channels_out == 0 {
            return Err(invalid("chain needs at least one input or output channel".to_string()));
        }
        Ok(())
    }

    /// Nominal bus layout for these channel counts
    pub fn layout(&self) -> BusesLayout {
        BusesLayout::from_channel_counts(self.channels_in, self.channels_out, self.channels_sidechain)
    }

    pub fn precision(&self) -> ProcessingPrecision {
        if self.double_precision {
            ProcessingPrecision::Double
        } else {
            ProcessingPrecision::Single
        }
    }
}

fn invalid(reason: String) -> ChainError {
    ChainError::InvalidConfig { reason }
}
