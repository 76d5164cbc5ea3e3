//! Effect chain orchestration
//!
//! [`Chain`] owns an ordered list of stages and routes every block through
//! them in index order (index 0 first). Control callers mutate the chain
//! while the audio thread keeps calling [`Chain::process_block`]; both go
//! through one exclusive region guarding the stage list and its aggregates.
//!
//! Adding a stage runs in explicit phases:
//!
//! 1. instantiate: create the stage and bind it to its unit
//! 2. negotiate: pick a channel layout
//! 3. prepare: precision, sample rate, block size
//! 4. pre-roll: push silent blocks through it
//! 5. insert: append under the lock and recompute aggregates
//!
//! Only the last phase holds the lock. Removal unloads the unit while the
//! lock is held, so a block never sees a half-unloaded stage; a slow unload
//! therefore stalls the audio thread for its duration.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::ChainConfig;
use crate::engine::{AudioBuffer, MidiBuffer};
use crate::error::{ChainError, Result};
use crate::layout::BusesLayout;
use crate::negotiation::negotiate;
use crate::preroll::pre_roll_stage;
use crate::stage::{LoadRequest, ProcessingPrecision, Stage, StageFactory, StageSample};

/// Callback receiving the chain's new total latency in samples
pub type LatencyListener = Arc<dyn Fn(u32) + Send + Sync>;

/// Outcome of a successful [`Chain::add_stage`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddStageReport {
    /// Position the stage was appended at
    pub index: usize,
    pub name: String,
    /// Chain latency after insertion
    pub latency_samples: u32,
    /// The new stage switched the chain's sidechain off
    pub sidechain_newly_disabled: bool,
    pub supports_double_precision: bool,
    /// Stage tail; an infinite tail is reported as 0
    pub tail_seconds: f64,
    pub num_output_channels: usize,
}

struct Slot {
    stage: Box<dyn Stage>,
    /// Named layout requested on insertion, reused on re-negotiation
    target: Option<String>,
}

/// Everything guarded by the chain's exclusive region
struct ChainState {
    slots: Vec<Slot>,
    layout: BusesLayout,
    sample_rate: f64,
    block_size: usize,
    has_sidechain: bool,
    sidechain_disabled: bool,
    extra_channels: usize,
    latency_samples: u32,
    tail_seconds: f64,
    supports_double: bool,
    precision: ProcessingPrecision,
}

/// Session values a new stage is configured against, copied out of the lock
#[derive(Debug, Clone)]
struct Session {
    layout: BusesLayout,
    sample_rate: f64,
    block_size: usize,
    extra_channels: usize,
    wants_double: bool,
}

impl ChainState {
    fn session(&self) -> Session {
        Session {
            layout: self.layout.clone(),
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            extra_channels: self.extra_channels,
            wants_double: self.wants_double(),
        }
    }

    fn wants_double(&self) -> bool {
        self.precision == ProcessingPrecision::Double && self.supports_double
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(ChainError::index_out_of_range(index, self.slots.len()))
        }
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, slot) in self.slots.iter_mut().enumerate().skip(start) {
            slot.stage.set_chain_index(i);
        }
    }

    /// Recompute every aggregate; returns the new latency if it changed
    fn update(&mut self) -> Option<u32> {
        let mut latency: u32 = 0;
        let mut supports_double = true;
        let mut extra_channels = 0;
        let mut needs_disabled_sidechain = false;
        for slot in &self.slots {
            let stage = slot.stage.as_ref();
            if !stage.is_suspended() {
                latency = latency.saturating_add(stage.latency_samples());
            }
            supports_double &= stage.supports_double_precision();
            let extra = stage.extra_in_channels().max(stage.extra_out_channels()).max(0);
            extra_channels = extra_channels.max(extra as usize);
            needs_disabled_sidechain |= stage.needs_disabled_sidechain();
        }
        self.supports_double = supports_double;
        self.extra_channels = extra_channels;
        self.sidechain_disabled = self.has_sidechain && needs_disabled_sidechain;
        self.update_tail();
        self.record_latency(latency)
    }

    /// Tail of the last stage, scanning from the end, that is not bypassed
    fn update_tail(&mut self) {
        self.tail_seconds = self
            .slots
            .iter()
            .rev()
            .find(|slot| !slot.stage.is_suspended())
            .map(|slot| slot.stage.tail_length_seconds())
            .unwrap_or(0.0);
    }

    fn record_latency(&mut self, latency: u32) -> Option<u32> {
        if latency == self.latency_samples {
            return None;
        }
        self.latency_samples = latency;
        Some(latency)
    }
}

/// Precision a stage should run with when the host asks for `wants_double`
fn precision_for(stage: &dyn Stage, wants_double: bool) -> ProcessingPrecision {
    if !wants_double {
        return ProcessingPrecision::Single;
    }
    if stage.supports_double_precision() {
        ProcessingPrecision::Double
    } else {
        warn!(
            "host wants double precision but '{}' does not support it",
            stage.name()
        );
        ProcessingPrecision::Single
    }
}

/// Ordered chain of hosted processing stages
pub struct Chain {
    state: Mutex<ChainState>,
    factory: Arc<dyn StageFactory>,
    pre_roll_samples: usize,
    latency_listener: RwLock<Option<LatencyListener>>,
}

impl Chain {
    /// Create an empty chain for a validated session configuration
    pub fn new(config: ChainConfig, factory: Arc<dyn StageFactory>) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        info!("creating chain with layout {}", layout);
        Ok(Self {
            state: Mutex::new(ChainState {
                slots: Vec::new(),
                has_sidechain: layout.has_sidechain(),
                layout,
                sample_rate: config.sample_rate,
                block_size: config.block_size,
                sidechain_disabled: false,
                extra_channels: 0,
                latency_samples: 0,
                tail_seconds: 0.0,
                supports_double: true,
                precision: config.precision(),
            }),
            factory,
            pre_roll_samples: config.pre_roll_samples,
            latency_listener: RwLock::new(None),
        })
    }

    /// Register the callback fired once per total latency change
    pub fn set_latency_listener<F>(&self, listener: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        *self.latency_listener.write() = Some(Arc::new(listener));
    }

    fn notify_latency(&self, change: Option<u32>) {
        let Some(latency) = change else {
            return;
        };
        let listener = self.latency_listener.read().clone();
        if let Some(listener) = listener {
            listener(latency);
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Instantiate `unit_id`, configure it and append it to the chain
    pub fn add_stage(&self, unit_id: &str, request: LoadRequest) -> Result<AddStageReport> {
        if request.multi_mono {
            return Err(ChainError::FeatureNotImplemented {
                feature: "Multi-Mono layout".to_string(),
            });
        }
        let target = request.target_layout().map(str::to_string);
        let session = self.state.lock().session();

        let mut stage = self.instantiate(unit_id, &request, &session)?;
        let extra_channels = match negotiate(stage.as_mut(), &session.layout, target.as_deref()) {
            Ok(negotiated) => negotiated.extra_channels(),
            Err(err) => {
                stage.unload();
                return Err(err);
            }
        };
        Self::prepare_stage(stage.as_mut(), &session);
        self.pre_roll(stage.as_mut(), &session, extra_channels);

        let (report, change) = {
            let mut state = self.state.lock();
            let current = state.session();
            if current.layout != session.layout
                || current.sample_rate != session.sample_rate
                || current.block_size != session.block_size
                || current.wants_double != session.wants_double
            {
                debug!(
                    "chain changed while '{}' was prepared, re-negotiating",
                    stage.name()
                );
                let extra_channels =
                    match negotiate(stage.as_mut(), &current.layout, target.as_deref()) {
                        Ok(negotiated) => negotiated.extra_channels(),
                        Err(err) => {
                            warn!("keeping '{}' in its current layout: {}", stage.name(), err);
                            stage.extra_in_channels().max(stage.extra_out_channels()).max(0)
                                as usize
                        }
                    };
                Self::prepare_stage(stage.as_mut(), &current);
                // Settled values from the first pass no longer apply; this
                // pass runs under the lock.
                self.pre_roll(stage.as_mut(), &current, extra_channels);
            }

            let was_disabled = state.sidechain_disabled;
            let index = state.slots.len();
            stage.set_chain_index(index);
            state.slots.push(Slot { stage, target });
            let change = state.update();

            let stage = state.slots[index].stage.as_ref();
            let tail = stage.tail_length_seconds();
            let report = AddStageReport {
                index,
                name: stage.name().to_string(),
                latency_samples: state.latency_samples,
                sidechain_newly_disabled: !was_disabled && state.sidechain_disabled,
                supports_double_precision: stage.supports_double_precision(),
                tail_seconds: if tail.is_finite() { tail } else { 0.0 },
                num_output_channels: stage.layout().total_output_channels(),
            };
            (report, change)
        };

        info!(
            "added '{}' at position {} (chain latency {} samples)",
            report.name, report.index, report.latency_samples
        );
        self.notify_latency(change);
        Ok(report)
    }

    fn instantiate(
        &self,
        unit_id: &str,
        request: &LoadRequest,
        session: &Session,
    ) -> Result<Box<dyn Stage>> {
        let mut stage = self
            .factory
            .create(unit_id, session.sample_rate, session.block_size)?;
        stage.load(request).map_err(|err| match err {
            err @ ChainError::UnitLoadFailed { .. } => err,
            other => ChainError::UnitLoadFailed {
                unit_id: unit_id.to_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(stage)
    }

    /// Pre-roll at the session's full width plus the widest extra channels
    fn pre_roll(&self, stage: &mut dyn Stage, session: &Session, extra_channels: usize) {
        pre_roll_stage(
            stage,
            session.layout.block_channels() + session.extra_channels.max(extra_channels),
            session.block_size,
            self.pre_roll_samples,
        );
    }

    fn prepare_stage(stage: &mut dyn Stage, session: &Session) {
        let precision = precision_for(stage, session.wants_double);
        stage.set_processing_precision(precision);
        stage.prepare(session.sample_rate, session.block_size);
    }

    /// Unload and drop the stage at `index`, shifting later stages down
    pub fn remove_stage(&self, index: usize) -> Result<()> {
        let (removed, change) = {
            let mut state = self.state.lock();
            state.check_index(index)?;
            let mut slot = state.slots.remove(index);
            slot.stage.unload();
            state.reindex_from(index);
            (slot, state.update())
        };
        info!("removed '{}' from position {}", removed.stage.name(), index);
        self.notify_latency(change);
        Ok(())
    }

    /// Exchange the stages at `a` and `b`
    pub fn swap_stages(&self, a: usize, b: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.check_index(a)?;
        state.check_index(b)?;
        state.slots.swap(a, b);
        state.slots[a].stage.set_chain_index(a);
        state.slots[b].stage.set_chain_index(b);
        // Latency and precision do not depend on order; the tail does.
        state.update_tail();
        debug!("swapped positions {} and {}", a, b);
        Ok(())
    }

    /// Suspend or resume the stage at `index`
    pub fn set_bypassed(&self, index: usize, bypassed: bool) -> Result<()> {
        let change = {
            let mut state = self.state.lock();
            state.check_index(index)?;
            state.slots[index].stage.set_suspended(bypassed);
            state.update()
        };
        debug!("position {} bypassed: {}", index, bypassed);
        self.notify_latency(change);
        Ok(())
    }

    /// Rebuild the nominal bus layout and re-negotiate every stage
    ///
    /// Returns the indices of stages left in a fallback layout.
    pub fn reconfigure_channels(
        &self,
        channels_in: usize,
        channels_out: usize,
        channels_sidechain: usize,
    ) -> Result<Vec<usize>> {
        if channels_in == 0 && channels_out == 0 {
            return Err(ChainError::InvalidConfig {
                reason: "chain needs at least one input or output channel".to_string(),
            });
        }
        let layout =
            BusesLayout::from_channel_counts(channels_in, channels_out, channels_sidechain);
        info!("setting chain layout to: {}", layout);

        let (degraded, change) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.layout = layout.clone();
            state.extra_channels = 0;
            state.has_sidechain = channels_sidechain > 0;
            state.sidechain_disabled = false;

            let mut degraded = Vec::new();
            for (i, slot) in state.slots.iter_mut().enumerate() {
                match negotiate(slot.stage.as_mut(), &layout, slot.target.as_deref()) {
                    Ok(negotiated) if negotiated.fallback => degraded.push(i),
                    Ok(_) => {}
                    Err(err) => {
                        warn!("position {} keeps its previous layout: {}", i, err);
                        degraded.push(i);
                    }
                }
            }
            (degraded, state.update())
        };
        self.notify_latency(change);
        Ok(degraded)
    }

    /// Start a processing session; forwarded to every stage
    pub fn prepare(&self, sample_rate: f64, block_size: usize) -> Result<()> {
        ChainConfig {
            sample_rate,
            block_size,
            ..ChainConfig::default()
        }
        .validate()?;
        let mut state = self.state.lock();
        state.sample_rate = sample_rate;
        state.block_size = block_size;
        for slot in state.slots.iter_mut() {
            slot.stage.prepare(sample_rate, block_size);
        }
        debug!("prepared chain for {} Hz / {} frames", sample_rate, block_size);
        Ok(())
    }

    /// End the processing session; forwarded to every stage
    pub fn release_resources(&self) {
        let mut state = self.state.lock();
        for slot in state.slots.iter_mut() {
            slot.stage.release_resources();
        }
    }

    /// Release resources, then unload and drop every stage
    pub fn clear(&self) {
        self.release_resources();
        let change = {
            let mut state = self.state.lock();
            for slot in state.slots.iter_mut() {
                slot.stage.unload();
            }
            state.slots.clear();
            state.update()
        };
        info!("cleared chain");
        self.notify_latency(change);
    }

    /// Recompute every aggregate, e.g. after a stage changed its own latency
    pub fn update(&self) {
        let change = self.state.lock().update();
        if let Some(latency) = change {
            debug!("updating latency samples to {}", latency);
        }
        self.notify_latency(change);
    }

    /// Set the host's processing precision
    ///
    /// Stages that support it switch to double precision when every stage
    /// in the chain does; all stages are re-prepared.
    pub fn set_processing_precision(&self, precision: ProcessingPrecision) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.precision = precision;
        let wants_double = state.wants_double();
        for slot in state.slots.iter_mut() {
            let stage = slot.stage.as_mut();
            let stage_precision = precision_for(stage, wants_double);
            stage.set_processing_precision(stage_precision);
            stage.prepare(state.sample_rate, state.block_size);
        }
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Route one block through every active stage in order
    ///
    /// A disabled sidechain region is zeroed first. Bypassed stages are
    /// skipped; only stages that actually ran count towards latency.
    pub fn process_block<T: StageSample>(&self, buffer: &mut AudioBuffer<T>, midi: &mut MidiBuffer) {
        let change = {
            let mut guard = self.state.lock();
            Self::process_locked(&mut guard, buffer, midi)
        };
        if let Some(latency) = change {
            trace!("updating latency samples to {}", latency);
        }
        self.notify_latency(change);
    }

    /// Like [`process_block`](Self::process_block) but gives up instead of
    /// waiting when a mutation holds the chain
    ///
    /// Returns `false` if the block was left untouched.
    pub fn try_process_block<T: StageSample>(
        &self,
        buffer: &mut AudioBuffer<T>,
        midi: &mut MidiBuffer,
    ) -> bool {
        let change = match self.state.try_lock() {
            Some(mut guard) => Self::process_locked(&mut guard, buffer, midi),
            None => return false,
        };
        self.notify_latency(change);
        true
    }

    fn process_locked<T: StageSample>(
        state: &mut ChainState,
        buffer: &mut AudioBuffer<T>,
        midi: &mut MidiBuffer,
    ) -> Option<u32> {
        if state.has_sidechain && state.sidechain_disabled {
            let start = state.layout.main_input_channels();
            buffer.clear_channels(start..start + state.layout.sidechain_channels());
        }
        let mut latency: u32 = 0;
        for slot in state.slots.iter_mut() {
            let stage = slot.stage.as_mut();
            if stage.is_suspended() {
                continue;
            }
            if T::process_stage(stage, buffer, midi) {
                latency = latency.saturating_add(stage.latency_samples());
            }
        }
        state.record_latency(latency)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    /// Total latency in samples
    pub fn latency_samples(&self) -> u32 {
        self.state.lock().latency_samples
    }

    /// Tail of the last non-bypassed stage, 0 when there is none
    pub fn tail_length_seconds(&self) -> f64 {
        self.state.lock().tail_seconds
    }

    /// True when every stage supports double precision
    pub fn supports_double_precision(&self) -> bool {
        self.state.lock().supports_double
    }

    pub fn processing_precision(&self) -> ProcessingPrecision {
        self.state.lock().precision
    }

    /// Largest number of channels any stage needs beyond the nominal I/O
    pub fn extra_channels(&self) -> usize {
        self.state.lock().extra_channels
    }

    pub fn layout(&self) -> BusesLayout {
        self.state.lock().layout.clone()
    }

    pub fn channels_in(&self) -> usize {
        self.state.lock().layout.main_input_channels()
    }

    pub fn channels_out(&self) -> usize {
        self.state.lock().layout.main_output_channels()
    }

    pub fn has_sidechain(&self) -> bool {
        self.state.lock().has_sidechain
    }

    pub fn is_sidechain_disabled(&self) -> bool {
        self.state.lock().sidechain_disabled
    }

    pub fn sample_rate(&self) -> f64 {
        self.state.lock().sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.state.lock().block_size
    }

    /// Value of parameter `param` on the stage at `index`
    pub fn parameter_value(&self, index: usize, param: usize) -> Result<f32> {
        let state = self.state.lock();
        state.check_index(index)?;
        Ok(state.slots[index].stage.parameter_value(param))
    }

    /// Run `f` against the stage at `index`
    pub fn with_stage<R>(&self, index: usize, f: impl FnOnce(&dyn Stage) -> R) -> Option<R> {
        let state = self.state.lock();
        state.slots.get(index).map(|slot| f(slot.stage.as_ref()))
    }

    /// Run `f` against the stage at `index`, then recompute aggregates
    pub fn with_stage_mut<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut dyn Stage) -> R,
    ) -> Option<R> {
        let (result, change) = {
            let mut state = self.state.lock();
            let slot = state.slots.get_mut(index)?;
            let result = f(slot.stage.as_mut());
            (result, state.update())
        };
        self.notify_latency(change);
        Some(result)
    }

    /// Stage names in signal-flow order
    pub fn stage_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .map(|slot| slot.stage.name().to_string())
            .collect()
    }

    /// Display string: stage names joined by `" > "`, bypassed stages as `<bypassed>`
    pub fn summary(&self) -> String {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .map(|slot| {
                if slot.stage.is_suspended() {
                    "<bypassed>".to_string()
                } else {
                    slot.stage.name().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Chain")
            .field("stages", &state.slots.len())
            .field("layout", &state.layout)
            .field("latency_samples", &state.latency_samples)
            .field("tail_seconds", &state.tail_seconds)
            .finish_non_exhaustive()
    }
}
