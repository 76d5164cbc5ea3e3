//! Mock units for testing and demos
//!
//! These units do no real signal processing beyond an optional gain. Their
//! reported capabilities (layouts, latency, tail, precision) are configurable
//! so chain bookkeeping can be exercised without a plugin host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{LoadRequest, ProcessingPrecision, Stage, StageFactory};
use crate::engine::{AudioBuffer, MidiBuffer, Sample};
use crate::error::{ChainError, Result};
use crate::layout::{BusesLayout, ChannelSet};

/// Unit identifier prefix understood by [`MockFactory`]
pub const MOCK_PREFIX: &str = "mock:";

/// Layouts every default mock unit accepts
pub fn standard_layouts() -> Vec<BusesLayout> {
    vec![
        BusesLayout::simple(1, 1),
        BusesLayout::simple(2, 2),
        BusesLayout::new(
            vec![ChannelSet::Stereo, ChannelSet::Mono],
            vec![ChannelSet::Stereo],
        ),
    ]
}

// ============================================================================
// Probe
// ============================================================================

/// Live view into a mock unit after it has been moved into a chain
#[derive(Debug, Default)]
pub struct MockProbe {
    latency: AtomicU32,
    frames_processed: AtomicUsize,
    blocks_processed: AtomicUsize,
    last_block_channels: AtomicUsize,
    unloads: AtomicUsize,
    fail_processing: AtomicBool,
}

impl MockProbe {
    /// Change the latency the unit reports from now on
    pub fn set_latency(&self, samples: u32) {
        self.latency.store(samples, Ordering::SeqCst);
    }

    /// Make the unit report "did not run" for every block
    pub fn set_fail_processing(&self, fail: bool) {
        self.fail_processing.store(fail, Ordering::SeqCst);
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::SeqCst)
    }

    pub fn blocks_processed(&self) -> usize {
        self.blocks_processed.load(Ordering::SeqCst)
    }

    /// Channel count of the most recent block the unit saw
    pub fn last_block_channels(&self) -> usize {
        self.last_block_channels.load(Ordering::SeqCst)
    }

    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Unit description
// ============================================================================

/// Capabilities of a mock unit
#[derive(Debug, Clone)]
pub struct MockUnit {
    name: String,
    layouts: Vec<BusesLayout>,
    settle_frames: usize,
    tail_seconds: f64,
    supports_double: bool,
    fail_load: bool,
    refuse_layouts: bool,
    gain: f32,
    parameters: Vec<f32>,
    probe: Arc<MockProbe>,
}

impl MockUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layouts: standard_layouts(),
            settle_frames: 0,
            tail_seconds: 0.0,
            supports_double: true,
            fail_load: false,
            refuse_layouts: false,
            gain: 1.0,
            parameters: Vec::new(),
            probe: Arc::new(MockProbe::default()),
        }
    }

    pub fn with_layouts(mut self, layouts: Vec<BusesLayout>) -> Self {
        self.layouts = layouts;
        self
    }

    pub fn with_latency(self, samples: u32) -> Self {
        self.probe.set_latency(samples);
        self
    }

    /// Report zero latency until `frames` frames have been processed
    pub fn settling_after(mut self, frames: usize) -> Self {
        self.settle_frames = frames;
        self
    }

    pub fn with_tail(mut self, seconds: f64) -> Self {
        self.tail_seconds = seconds;
        self
    }

    pub fn with_double_precision(mut self, supported: bool) -> Self {
        self.supports_double = supported;
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Accept nothing in `set_layout`, while still advertising layouts
    pub fn refusing_layouts(mut self) -> Self {
        self.refuse_layouts = true;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_parameters(mut self, values: Vec<f32>) -> Self {
        self.parameters = values;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layouts(&self) -> &[BusesLayout] {
        &self.layouts
    }

    /// Shared probe; stages created from clones of this unit share it
    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }

    /// Parse `mock:<name>[:latency[:tail]]`
    pub fn parse(unit_id: &str) -> Option<Self> {
        let spec = unit_id.strip_prefix(MOCK_PREFIX)?;
        let mut parts = spec.split(':');
        let name = parts.next().filter(|n| !n.is_empty())?;
        let mut unit = MockUnit::new(name);
        if let Some(latency) = parts.next() {
            unit = unit.with_latency(latency.parse().ok()?);
        }
        if let Some(tail) = parts.next() {
            unit = unit.with_tail(tail.parse().ok()?);
        }
        if parts.next().is_some() {
            return None;
        }
        Some(unit)
    }
}

// ============================================================================
// Stage
// ============================================================================

/// Stage backed by a [`MockUnit`]
#[derive(Debug)]
pub struct MockStage {
    unit_id: String,
    unit: MockUnit,
    loaded: bool,
    settings: String,
    cached_layouts: Option<Vec<BusesLayout>>,
    layout: BusesLayout,
    extra_in: i32,
    extra_out: i32,
    suspended: bool,
    precision: ProcessingPrecision,
    chain_index: usize,
    sample_rate: f64,
    block_size: usize,
}

impl MockStage {
    pub fn new(unit_id: impl Into<String>, unit: MockUnit) -> Self {
        let layout = unit.layouts.first().cloned().unwrap_or_default();
        Self {
            unit_id: unit_id.into(),
            unit,
            loaded: false,
            settings: String::new(),
            cached_layouts: None,
            layout,
            extra_in: 0,
            extra_out: 0,
            suspended: false,
            precision: ProcessingPrecision::Single,
            chain_index: 0,
            sample_rate: 0.0,
            block_size: 0,
        }
    }

    /// Settings restored by the last `load`
    pub fn settings(&self) -> &str {
        &self.settings
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn run<T: Sample>(&mut self, buffer: &mut AudioBuffer<T>) -> bool {
        let probe = &self.unit.probe;
        if !self.loaded || probe.fail_processing.load(Ordering::SeqCst) {
            return false;
        }
        if (self.unit.gain - 1.0).abs() > f32::EPSILON {
            let gain = T::from(self.unit.gain).unwrap_or_else(T::one);
            buffer.samples_mut().iter_mut().for_each(|s| *s = *s * gain);
        }
        probe
            .frames_processed
            .fetch_add(buffer.num_frames(), Ordering::SeqCst);
        probe.blocks_processed.fetch_add(1, Ordering::SeqCst);
        probe
            .last_block_channels
            .store(buffer.num_channels(), Ordering::SeqCst);
        true
    }
}

impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.unit.name
    }

    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn load(&mut self, request: &LoadRequest) -> Result<()> {
        if self.unit.fail_load {
            return Err(ChainError::UnitLoadFailed {
                unit_id: self.unit_id.clone(),
                reason: "unit refused to instantiate".to_string(),
            });
        }
        self.settings = request.settings.clone();
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) {
        if self.loaded {
            self.loaded = false;
            self.unit.probe.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
    }

    fn release_resources(&mut self) {
        self.block_size = 0;
    }

    fn supported_layouts(&mut self) -> &[BusesLayout] {
        let layouts = &self.unit.layouts;
        self.cached_layouts.get_or_insert_with(|| layouts.clone())
    }

    fn set_layout(&mut self, layout: &BusesLayout) -> bool {
        if self.unit.refuse_layouts || !self.unit.layouts.contains(layout) {
            return false;
        }
        self.layout = layout.clone();
        true
    }

    fn layout(&self) -> BusesLayout {
        self.layout.clone()
    }

    fn set_extra_channels(&mut self, extra_in: i32, extra_out: i32) {
        self.extra_in = extra_in;
        self.extra_out = extra_out;
    }

    fn extra_in_channels(&self) -> i32 {
        self.extra_in
    }

    fn extra_out_channels(&self) -> i32 {
        self.extra_out
    }

    fn latency_samples(&self) -> u32 {
        if self.unit.probe.frames_processed() < self.unit.settle_frames {
            0
        } else {
            self.unit.probe.latency.load(Ordering::SeqCst)
        }
    }

    fn tail_length_seconds(&self) -> f64 {
        self.unit.tail_seconds
    }

    fn supports_double_precision(&self) -> bool {
        self.unit.supports_double
    }

    fn set_processing_precision(&mut self, precision: ProcessingPrecision) {
        self.precision = precision;
    }

    fn processing_precision(&self) -> ProcessingPrecision {
        self.precision
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer<f32>, _midi: &mut MidiBuffer) -> bool {
        self.run(buffer)
    }

    fn process_block_double(
        &mut self,
        buffer: &mut AudioBuffer<f64>,
        _midi: &mut MidiBuffer,
    ) -> bool {
        self.unit.supports_double && self.run(buffer)
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    fn parameter_value(&self, index: usize) -> f32 {
        self.unit.parameters.get(index).copied().unwrap_or(0.0)
    }

    fn set_chain_index(&mut self, index: usize) {
        self.chain_index = index;
    }

    fn chain_index(&self) -> usize {
        self.chain_index
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Factory resolving registered mock units and `mock:` identifiers
#[derive(Debug, Default, Clone)]
pub struct MockFactory {
    units: HashMap<String, MockUnit>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit under `unit_id`, returning its probe
    pub fn register(&mut self, unit_id: impl Into<String>, unit: MockUnit) -> Arc<MockProbe> {
        let probe = unit.probe();
        self.units.insert(unit_id.into(), unit);
        probe
    }

    pub fn with_unit(mut self, unit_id: impl Into<String>, unit: MockUnit) -> Self {
        self.register(unit_id, unit);
        self
    }

    /// Resolve a unit description without instantiating a stage
    pub fn resolve(&self, unit_id: &str) -> Option<MockUnit> {
        self.units
            .get(unit_id)
            .cloned()
            .or_else(|| MockUnit::parse(unit_id))
    }
}

impl StageFactory for MockFactory {
    fn create(
        &self,
        unit_id: &str,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Box<dyn Stage>> {
        let unit = self
            .resolve(unit_id)
            .ok_or_else(|| ChainError::UnitLoadFailed {
                unit_id: unit_id.to_string(),
                reason: "unknown unit".to_string(),
            })?;
        let mut stage = MockStage::new(unit_id, unit);
        stage.prepare(sample_rate, block_size);
        Ok(Box::new(stage))
    }
}

// ============================================================================
// Tests
// ============================================================================
