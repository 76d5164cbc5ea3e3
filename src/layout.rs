//! Channel layouts
//!
//! A [`BusesLayout`] lists the input buses (main, then sidechain) and output
//! buses a stage reads and writes. The chain builds its own nominal layout
//! from plain channel counts; stages report the set of layouts they accept.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Layout name meaning "no explicit target, negotiate freely"
pub const DEFAULT_LAYOUT: &str = "Default";

/// Returns the named target layout, or `None` for an empty or default hint
pub fn named_target(hint: Option<&str>) -> Option<&str> {
    hint.filter(|name| !name.is_empty() && *name != DEFAULT_LAYOUT)
}

// ============================================================================
// Channel Set
// ============================================================================

/// Channel configuration of a single bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelSet {
    /// Bus present but carrying no channels
    #[default]
    Disabled,
    Mono,
    Stereo,
    /// Unordered set of `n` channels
    Discrete(usize),
}

impl ChannelSet {
    /// Bus for a channel count: 1 is mono, 2 is stereo, more is discrete
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => ChannelSet::Disabled,
            1 => ChannelSet::Mono,
            2 => ChannelSet::Stereo,
            n => ChannelSet::Discrete(n),
        }
    }

    /// Number of channels on this bus
    pub fn size(&self) -> usize {
        match self {
            ChannelSet::Disabled => 0,
            ChannelSet::Mono => 1,
            ChannelSet::Stereo => 2,
            ChannelSet::Discrete(n) => *n,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.size() == 0
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSet::Disabled => write!(f, "Disabled"),
            ChannelSet::Mono => write!(f, "Mono"),
            ChannelSet::Stereo => write!(f, "Stereo"),
            ChannelSet::Discrete(n) => write!(f, "Discrete {}", n),
        }
    }
}

// ============================================================================
// Buses Layout
// ============================================================================

/// Input and output buses of a stage or of the chain
///
/// Input bus 0 is the main input, input bus 1 (if any) the sidechain.
/// Output bus 0 is the main output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusesLayout {
    pub inputs: Vec<ChannelSet>,
    pub outputs: Vec<ChannelSet>,
}

impl BusesLayout {
    pub fn new(inputs: Vec<ChannelSet>, outputs: Vec<ChannelSet>) -> Self {
        Self { inputs, outputs }
    }

    /// Single main input and output bus
    pub fn simple(channels_in: usize, channels_out: usize) -> Self {
        Self::from_channel_counts(channels_in, channels_out, 0)
    }

    /// Build the chain's nominal layout from channel counts
    ///
    /// A count of zero leaves the bus out. When only a sidechain is present
    /// the main input is kept as a disabled bus so the sidechain stays on bus 1.
    pub fn from_channel_counts(
        channels_in: usize,
        channels_out: usize,
        channels_sidechain: usize,
    ) -> Self {
        let mut inputs = Vec::with_capacity(2);
        if channels_in > 0 || channels_sidechain > 0 {
            inputs.push(ChannelSet::for_count(channels_in));
        }
        if channels_sidechain > 0 {
            inputs.push(ChannelSet::for_count(channels_sidechain));
        }
        let outputs = if channels_out > 0 {
            vec![ChannelSet::for_count(channels_out)]
        } else {
            Vec::new()
        };
        Self { inputs, outputs }
    }

    /// Channels on the main input bus
    pub fn main_input_channels(&self) -> usize {
        self.inputs.first().map(ChannelSet::size).unwrap_or(0)
    }

    /// Channels on the main output bus
    pub fn main_output_channels(&self) -> usize {
        self.outputs.first().map(ChannelSet::size).unwrap_or(0)
    }

    /// Main bus channel count on the requested side
    pub fn num_channels(&self, is_input: bool) -> usize {
        if is_input {
            self.main_input_channels()
        } else {
            self.main_output_channels()
        }
    }

    /// Channels on the sidechain bus (input bus 1)
    pub fn sidechain_channels(&self) -> usize {
        self.inputs.get(1).map(ChannelSet::size).unwrap_or(0)
    }

    pub fn has_sidechain(&self) -> bool {
        self.sidechain_channels() > 0
    }

    /// Channels across every input bus
    pub fn total_input_channels(&self) -> usize {
        self.inputs.iter().map(ChannelSet::size).sum()
    }

    /// Channels across every output bus
    pub fn total_output_channels(&self) -> usize {
        self.outputs.iter().map(ChannelSet::size).sum()
    }

    /// Width of an interleaved block able to carry every bus
    pub fn block_channels(&self) -> usize {
        self.total_input_channels().max(self.total_output_channels())
    }

    /// Name of the output side, e.g. `"Stereo"`; used to match named targets
    pub fn describe_outputs(&self) -> String {
        describe_buses(&self.outputs)
    }

    /// Name of the input side, e.g. `"Stereo + Mono"`
    pub fn describe_inputs(&self) -> String {
        describe_buses(&self.inputs)
    }
}

fn describe_buses(buses: &[ChannelSet]) -> String {
    if buses.is_empty() {
        return "None".to_string();
    }
    buses
        .iter()
        .map(ChannelSet::to_string)
        .collect::<Vec<_>>()
        .join(" + ")
}

impl fmt::Display for BusesLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.describe_inputs(), self.describe_outputs())
    }
}
