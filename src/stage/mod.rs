//! Stage trait definition
//!
//! A stage wraps one hosted processing unit. The chain only ever talks to
//! stages through [`Stage`]; concrete bindings come from a [`StageFactory`]
//! supplied by the plugin-hosting layer.

pub mod mock;

use serde::{Deserialize, Serialize};

use crate::engine::{AudioBuffer, MidiBuffer, Sample};
use crate::error::Result;
use crate::layout::{named_target, BusesLayout};

/// Sample precision a stage processes with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingPrecision {
    #[default]
    Single,
    Double,
}

/// Everything a stage needs to bind itself to a unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRequest {
    /// Opaque settings blob restored into the unit
    pub settings: String,
    /// Named output layout to prefer (`None` or `"Default"` negotiates freely)
    pub layout: Option<String>,
    /// Run one mono instance per channel
    pub multi_mono: bool,
    /// Channels handled by multi-mono instances, one bit per channel
    pub mono_channels: u64,
}

impl LoadRequest {
    pub fn new(settings: impl Into<String>) -> Self {
        Self {
            settings: settings.into(),
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn with_multi_mono(mut self, mono_channels: u64) -> Self {
        self.multi_mono = true;
        self.mono_channels = mono_channels;
        self
    }

    /// Named target layout, if one was actually requested
    pub fn target_layout(&self) -> Option<&str> {
        named_target(self.layout.as_deref())
    }
}

/// One hosted processing unit inside the chain
///
/// Implementations must not panic in `process_block*`; a unit that fails
/// internally returns `false` ("did not run") instead.
pub trait Stage: Send {
    /// Human-readable unit name
    fn name(&self) -> &str;

    /// Identifier of the unit this stage wraps
    fn unit_id(&self) -> &str;

    /// Bind the stage to its unit and restore `request.settings`
    fn load(&mut self, request: &LoadRequest) -> Result<()>;

    /// Release the unit
    fn unload(&mut self);

    fn is_loaded(&self) -> bool;

    /// Called when sample rate or block size is (re)established
    fn prepare(&mut self, sample_rate: f64, block_size: usize);

    fn release_resources(&mut self);

    /// Layouts the unit accepts
    ///
    /// Computed lazily on first call and cached for the unit's lifetime.
    fn supported_layouts(&mut self) -> &[BusesLayout];

    /// Apply a layout; returns `false` if the unit refused it
    fn set_layout(&mut self, layout: &BusesLayout) -> bool;

    /// Layout currently active on the unit
    fn layout(&self) -> BusesLayout;

    /// Record channels needed beyond the chain's nominal I/O
    fn set_extra_channels(&mut self, extra_in: i32, extra_out: i32);

    fn extra_in_channels(&self) -> i32;

    fn extra_out_channels(&self) -> i32;

    fn latency_samples(&self) -> u32;

    /// Seconds of output after input stops; may be infinite
    fn tail_length_seconds(&self) -> f64;

    fn supports_double_precision(&self) -> bool;

    fn set_processing_precision(&mut self, precision: ProcessingPrecision);

    fn processing_precision(&self) -> ProcessingPrecision;

    /// Process one block in place; returns whether the unit actually ran
    fn process_block(&mut self, buffer: &mut AudioBuffer<f32>, midi: &mut MidiBuffer) -> bool;

    /// Double precision variant; units without f64 support do not run
    fn process_block_double(
        &mut self,
        _buffer: &mut AudioBuffer<f64>,
        _midi: &mut MidiBuffer,
    ) -> bool {
        false
    }

    /// Bypass state
    fn is_suspended(&self) -> bool;

    fn set_suspended(&mut self, suspended: bool);

    /// Normalized value of a unit parameter (0.0 for unknown indices)
    fn parameter_value(&self, index: usize) -> f32;

    /// Whether a present sidechain bus must be fed silence for this stage
    fn needs_disabled_sidechain(&self) -> bool {
        !self.layout().has_sidechain()
    }

    /// Position of this stage in the chain
    fn set_chain_index(&mut self, index: usize);

    fn chain_index(&self) -> usize;
}

/// Creates stages for unit identifiers (the plugin-hosting layer)
pub trait StageFactory: Send + Sync {
    /// Instantiate an unloaded stage for `unit_id`
    fn create(&self, unit_id: &str, sample_rate: f64, block_size: usize)
        -> Result<Box<dyn Stage>>;
}

/// Sample types a stage can be driven with
pub trait StageSample: Sample {
    const PRECISION: ProcessingPrecision;

    fn process_stage(
        stage: &mut dyn Stage,
        buffer: &mut AudioBuffer<Self>,
        midi: &mut MidiBuffer,
    ) -> bool;
}

impl StageSample for f32 {
    const PRECISION: ProcessingPrecision = ProcessingPrecision::Single;

    fn process_stage(
        stage: &mut dyn Stage,
        buffer: &mut AudioBuffer<f32>,
        midi: &mut MidiBuffer,
    ) -> bool {
        stage.process_block(buffer, midi)
    }
}

impl StageSample for f64 {
    const PRECISION: ProcessingPrecision = ProcessingPrecision::Double;

    fn process_stage(
        stage: &mut dyn Stage,
        buffer: &mut AudioBuffer<f64>,
        midi: &mut MidiBuffer,
    ) -> bool {
        stage.process_block_double(buffer, midi)
    }
}
