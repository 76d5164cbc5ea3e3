//! Layout negotiation
//!
//! Picks the layout a stage runs with, given the chain's nominal layout and
//! an optional named output target. Strategies are tried in order and the
//! first one to propose a candidate wins:
//!
//! 1. [`Strategy::NamedTarget`] (only when a named target is given)
//! 2. [`Strategy::ExactMatch`]
//! 3. [`Strategy::MatchingOutputs`]
//! 4. [`Strategy::BestEffort`]
//!
//! A named target never falls through to the default strategies. If the
//! stage refuses the chosen layout, it keeps whatever layout it already had.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{ChainError, Result};
use crate::layout::{named_target, BusesLayout, DEFAULT_LAYOUT};
use crate::stage::Stage;

/// A layout proposed by a strategy, with its main-bus channel counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub layout: BusesLayout,
    pub channels_in: usize,
    pub channels_out: usize,
}

impl Candidate {
    fn from_layout(layout: &BusesLayout) -> Self {
        Self {
            layout: layout.clone(),
            channels_in: layout.main_input_channels(),
            channels_out: layout.main_output_channels(),
        }
    }
}

/// Inputs shared by every strategy
#[derive(Debug, Clone, Copy)]
pub struct NegotiationContext<'a> {
    pub chain_layout: &'a BusesLayout,
    pub channels_in: usize,
    pub channels_out: usize,
    pub target: Option<&'a str>,
}

impl<'a> NegotiationContext<'a> {
    pub fn new(chain_layout: &'a BusesLayout, target: Option<&'a str>) -> Self {
        Self {
            chain_layout,
            channels_in: chain_layout.main_input_channels(),
            channels_out: chain_layout.main_output_channels(),
            target: named_target(target),
        }
    }
}

/// One step of the negotiation fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Layouts whose output description equals the requested name
    NamedTarget,
    /// The chain's own layout, unchanged
    ExactMatch,
    /// Same output count as the chain, widest input
    MatchingOutputs,
    /// Widest output, then widest input
    BestEffort,
}

const NAMED_PLAN: &[Strategy] = &[Strategy::NamedTarget];
const DEFAULT_PLAN: &[Strategy] = &[
    Strategy::ExactMatch,
    Strategy::MatchingOutputs,
    Strategy::BestEffort,
];

impl Strategy {
    /// Strategies to try, in order, for a context
    pub fn plan(ctx: &NegotiationContext<'_>) -> &'static [Strategy] {
        if ctx.target.is_some() {
            NAMED_PLAN
        } else {
            DEFAULT_PLAN
        }
    }

    /// Propose a layout from `supported`, or `None`
    pub fn propose(
        self,
        ctx: &NegotiationContext<'_>,
        supported: &[BusesLayout],
    ) -> Option<Candidate> {
        match self {
            Strategy::NamedTarget => named_match(ctx, supported),
            Strategy::ExactMatch => supported
                .contains(ctx.chain_layout)
                .then(|| Candidate::from_layout(ctx.chain_layout)),
            Strategy::MatchingOutputs => matching_outputs(ctx, supported),
            Strategy::BestEffort => best_effort(supported),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::NamedTarget => write!(f, "named target"),
            Strategy::ExactMatch => write!(f, "exact match"),
            Strategy::MatchingOutputs => write!(f, "matching outputs"),
            Strategy::BestEffort => write!(f, "best effort"),
        }
    }
}

fn named_match(ctx: &NegotiationContext<'_>, supported: &[BusesLayout]) -> Option<Candidate> {
    let target = ctx.target?;
    let mut best: Option<Candidate> = None;
    for layout in supported.iter().filter(|l| l.describe_outputs() == target) {
        let candidate = Candidate::from_layout(layout);
        if ctx.channels_in == 0 || candidate.channels_in == candidate.channels_out {
            return Some(candidate);
        }
        let widest_in = best.as_ref().map(|b| b.channels_in).unwrap_or(0);
        if candidate.channels_in > widest_in {
            best = Some(candidate);
        }
    }
    best
}

fn matching_outputs(ctx: &NegotiationContext<'_>, supported: &[BusesLayout]) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for layout in supported {
        let candidate = Candidate::from_layout(layout);
        if candidate.channels_out != ctx.channels_out {
            continue;
        }
        let widest_in = best.as_ref().map(|b| b.channels_in).unwrap_or(0);
        // Without chain inputs any matching output count will do; the last one wins.
        if ctx.channels_in == 0 || candidate.channels_in > widest_in {
            best = Some(candidate);
        }
    }
    best
}

fn best_effort(supported: &[BusesLayout]) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for layout in supported {
        let candidate = Candidate::from_layout(layout);
        let (best_in, best_out) = best
            .as_ref()
            .map(|b| (b.channels_in, b.channels_out))
            .unwrap_or((0, 0));
        if candidate.channels_out > best_out
            || (candidate.channels_out == best_out && candidate.channels_in > best_in)
        {
            best = Some(candidate);
        }
    }
    best
}

/// Result of negotiating one stage
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated {
    /// Layout the stage now runs with
    pub layout: BusesLayout,
    /// Strategy that produced the candidate
    pub strategy: Strategy,
    /// The stage refused the candidate and kept its previous layout
    pub fallback: bool,
    pub extra_in: i32,
    pub extra_out: i32,
}

impl Negotiated {
    /// Extra channels a scratch block needs for this stage
    pub fn extra_channels(&self) -> usize {
        self.extra_in.max(self.extra_out).max(0) as usize
    }
}

/// Run every strategy in order and pick the first candidate
pub fn select(ctx: &NegotiationContext<'_>, supported: &[BusesLayout]) -> Option<(Strategy, Candidate)> {
    Strategy::plan(ctx)
        .iter()
        .find_map(|strategy| strategy.propose(ctx, supported).map(|c| (*strategy, c)))
}

/// Negotiate and apply a layout for `stage` against the chain's layout
///
/// On success the stage's extra channel counts are updated. When no
/// candidate exists the stage is left untouched and `LayoutUnavailable`
/// is returned.
pub fn negotiate(
    stage: &mut dyn Stage,
    chain_layout: &BusesLayout,
    target: Option<&str>,
) -> Result<Negotiated> {
    if !stage.is_loaded() {
        return Err(ChainError::UnitLoadFailed {
            unit_id: stage.unit_id().to_string(),
            reason: "stage is not loaded".to_string(),
        });
    }

    let ctx = NegotiationContext::new(chain_layout, target);
    let supported = stage.supported_layouts().to_vec();
    if supported.is_empty() {
        debug!("{} reports no supported layouts", stage.name());
    }

    let Some((strategy, candidate)) = select(&ctx, &supported) else {
        warn!(
            "no matching I/O layout found for {}, target={}",
            stage.name(),
            ctx.target.unwrap_or(DEFAULT_LAYOUT)
        );
        return Err(ChainError::LayoutUnavailable {
            unit_id: stage.unit_id().to_string(),
            target: ctx.target.unwrap_or(DEFAULT_LAYOUT).to_string(),
        });
    };

    let (layout, fallback) = if stage.set_layout(&candidate.layout) {
        (candidate.layout, false)
    } else {
        let current = stage.layout();
        warn!(
            "{} refused {} ({}), falling back to its current layout {}",
            stage.name(),
            candidate.layout,
            strategy,
            current
        );
        // The current layout is not re-checked against the chain; flag a
        // mismatch so a degraded stage is visible in the logs.
        if current.main_input_channels() < ctx.channels_in
            || current.main_output_channels() < ctx.channels_out
        {
            warn!(
                "fallback layout {} of {} does not cover the chain's {} in / {} out",
                current,
                stage.name(),
                ctx.channels_in,
                ctx.channels_out
            );
        }
        (current, true)
    };

    let extra_in = layout.main_input_channels() as i32 - ctx.channels_in as i32;
    let extra_out = layout.main_output_channels() as i32 - ctx.channels_out as i32;
    stage.set_extra_channels(extra_in, extra_out);

    debug!(
        "{}: {} extra input(s), {} extra output(s), I/O layout {} via {}",
        stage.name(),
        extra_in,
        extra_out,
        layout,
        strategy
    );

    Ok(Negotiated {
        layout,
        strategy,
        fallback,
        extra_in,
        extra_out,
    })
}
