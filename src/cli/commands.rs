//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::parse_stage_arg;
use crate::chain::Chain;
use crate::config::ChainConfig;
use crate::engine::{AudioBuffer, MidiBuffer};
use crate::error::{ChainError, Result};
use crate::stage::mock::MockFactory;
use crate::stage::{LoadRequest, ProcessingPrecision, StageSample};

/// Mutations applied by `run` after all stages were added
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub stages: Vec<String>,
    pub blocks: usize,
    pub bypass: Vec<usize>,
    pub swap: Option<(usize, usize)>,
    pub remove: Option<usize>,
}

/// Build a chain of mock units, mutate it and process silent blocks.
pub fn run(config: Option<&Path>, plan: &RunPlan) -> Result<()> {
    let config = match config {
        Some(path) => ChainConfig::load(path)?,
        None => ChainConfig::default(),
    };
    let chain = build_chain(config, plan)?;

    let processed = process_silence(&chain, plan.blocks);
    info!("processed {} block(s)", processed);

    println!("Chain:         {}", chain);
    println!("Layout:        {}", chain.layout());
    println!("Latency:       {} samples", chain.latency_samples());
    println!("Tail:          {:.3} s", chain.tail_length_seconds());
    println!("Extra chans:   {}", chain.extra_channels());
    println!(
        "Precision:     {:?} (double supported: {})",
        chain.processing_precision(),
        chain.supports_double_precision()
    );
    if chain.is_sidechain_disabled() {
        println!("Sidechain:     disabled");
    }
    Ok(())
}

/// Create the chain described by `plan` and apply its mutations
pub fn build_chain(config: ChainConfig, plan: &RunPlan) -> Result<Chain> {
    let chain = Chain::new(config, Arc::new(MockFactory::new()))?;
    chain.set_latency_listener(|latency| info!("chain latency is now {} samples", latency));

    for arg in &plan.stages {
        let (unit_id, layout) = parse_stage_arg(arg);
        let mut request = LoadRequest::default();
        if let Some(layout) = layout {
            request = request.with_layout(layout);
        }
        let report = chain.add_stage(unit_id, request)?;
        println!("{}", serde_json::to_string(&report)?);
    }
    for &index in &plan.bypass {
        chain.set_bypassed(index, true)?;
    }
    if let Some((a, b)) = plan.swap {
        chain.swap_stages(a, b)?;
    }
    if let Some(index) = plan.remove {
        chain.remove_stage(index)?;
    }
    Ok(chain)
}

/// Feed `blocks` silent blocks through the chain at its precision
pub fn process_silence(chain: &Chain, blocks: usize) -> usize {
    let double = chain.processing_precision() == ProcessingPrecision::Double
        && chain.supports_double_precision();
    if double {
        process_blocks::<f64>(chain, blocks)
    } else {
        process_blocks::<f32>(chain, blocks)
    }
}

fn process_blocks<T: StageSample>(chain: &Chain, blocks: usize) -> usize {
    let layout = chain.layout();
    let channels = layout.block_channels() + chain.extra_channels();
    let mut buffer = AudioBuffer::<T>::new(channels, chain.block_size());
    let mut midi = MidiBuffer::new();
    for _ in 0..blocks {
        chain.process_block(&mut buffer, &mut midi);
        buffer.clear();
    }
    blocks
}

/// Print the layouts a mock unit supports.
pub fn show_layouts(unit_id: &str) -> Result<()> {
    let unit = MockFactory::new()
        .resolve(unit_id)
        .ok_or_else(|| ChainError::UnitLoadFailed {
            unit_id: unit_id.to_string(),
            reason: "unknown unit".to_string(),
        })?;

    println!("Layouts for {}:", unit.name());
    println!("{:-<60}", "");
    for layout in unit.layouts() {
        println!(
            "  in: {:<24} out: {}",
            layout.describe_inputs(),
            layout.describe_outputs()
        );
    }
    Ok(())
}

/// Write a default config file.
pub fn init_config(path: &Path) -> Result<()> {
    info!("Writing default config to: {}", path.display());
    ChainConfig::default().save(path)?;
    println!("Config written: {}", path.display());
    Ok(())
}
