//! Layout Negotiation Integration Tests
//!
//! Layout selection as seen through `Chain::add_stage` and
//! `Chain::reconfigure_channels`.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use test_case::test_case;

use fxchain::negotiation::{negotiate, select, NegotiationContext, Strategy};
use fxchain::stage::mock::{MockFactory, MockStage, MockUnit};
use fxchain::{BusesLayout, Chain, ChainConfig, ChannelSet, LoadRequest, Stage};

fn config(channels_in: usize, channels_out: usize, sidechain: usize) -> ChainConfig {
    ChainConfig::default()
        .with_block_size(64)
        .with_channels(channels_in, channels_out, sidechain)
}

fn chain_with_unit(config: ChainConfig, unit: MockUnit) -> Chain {
    let factory = MockFactory::new().with_unit("unit", unit);
    Chain::new(config, Arc::new(factory)).unwrap()
}

fn layout_of(chain: &Chain, index: usize) -> BusesLayout {
    chain.with_stage(index, |s| s.layout()).unwrap()
}

fn extras_of(chain: &Chain, index: usize) -> (i32, i32) {
    chain
        .with_stage(index, |s| (s.extra_in_channels(), s.extra_out_channels()))
        .unwrap()
}

#[test]
fn test_exact_match_needs_no_extra_channels() {
    let unit = MockUnit::new("eq").with_layouts(vec![
        BusesLayout::simple(1, 1),
        BusesLayout::simple(2, 2),
    ]);
    let chain = chain_with_unit(config(2, 2, 0), unit);
    chain.add_stage("unit", LoadRequest::default()).unwrap();

    assert_eq!(layout_of(&chain, 0), BusesLayout::simple(2, 2));
    assert_eq!(extras_of(&chain, 0), (0, 0));
    assert_eq!(chain.extra_channels(), 0);
}

#[test]
fn test_renegotiating_exact_match_is_idempotent() {
    let mut stage = MockStage::new("eq", MockUnit::new("eq"));
    stage.load(&LoadRequest::default()).unwrap();
    let chain_layout = BusesLayout::simple(2, 2);

    let first = negotiate(&mut stage, &chain_layout, None).unwrap();
    let second = negotiate(&mut stage, &chain_layout, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.strategy, Strategy::ExactMatch);
    assert_eq!((stage.extra_in_channels(), stage.extra_out_channels()), (0, 0));
}

#[test]
fn test_sidechain_chain_with_plain_unit() {
    let unit = MockUnit::new("comp").with_layouts(vec![BusesLayout::simple(2, 2)]);
    let chain = chain_with_unit(config(2, 2, 1), unit);

    let report = chain.add_stage("unit", LoadRequest::default()).unwrap();

    assert_eq!(layout_of(&chain, 0), BusesLayout::simple(2, 2));
    assert!(report.sidechain_newly_disabled);
    assert!(chain.has_sidechain());
    assert!(chain.is_sidechain_disabled());
}

#[test]
fn test_wider_unit_reports_extra_channels() {
    let unit = MockUnit::new("surround").with_layouts(vec![BusesLayout::simple(6, 6)]);
    let chain = chain_with_unit(config(2, 2, 0), unit);
    chain.add_stage("unit", LoadRequest::default()).unwrap();

    assert_eq!(extras_of(&chain, 0), (4, 4));
    assert_eq!(chain.extra_channels(), 4);
}

#[test]
fn test_pre_roll_block_covers_extra_channels() {
    let mut factory = MockFactory::new();
    let probe = factory.register(
        "surround",
        MockUnit::new("surround").with_layouts(vec![BusesLayout::simple(6, 6)]),
    );
    let chain = Chain::new(config(2, 2, 0), Arc::new(factory)).unwrap();
    chain.add_stage("surround", LoadRequest::default()).unwrap();

    assert_eq!(probe.last_block_channels(), 6);
}

#[test]
fn test_unmatched_named_target_leaves_chain_untouched() {
    let chain = chain_with_unit(config(2, 2, 0), MockUnit::new("eq"));
    chain.add_stage("unit", LoadRequest::default()).unwrap();

    let err = chain
        .add_stage("unit", LoadRequest::default().with_layout("Discrete 8"))
        .unwrap_err();

    assert_eq!(err.error_code(), "LAYOUT_UNAVAILABLE");
    assert!(err.is_recoverable());
    assert_eq!(chain.len(), 1);
    assert_eq!(layout_of(&chain, 0), BusesLayout::simple(2, 2));
}

#[test]
fn test_named_target_unloads_rejected_stage() {
    let mut factory = MockFactory::new();
    let probe = factory.register("eq", MockUnit::new("eq"));
    let chain = Chain::new(config(2, 2, 0), Arc::new(factory)).unwrap();

    assert!(chain
        .add_stage("eq", LoadRequest::default().with_layout("Discrete 5"))
        .is_err());
    assert_eq!(probe.unload_count(), 1);
}

#[test_case("Mono", BusesLayout::simple(1, 1) ; "mono target")]
#[test_case("Stereo", BusesLayout::simple(2, 2) ; "stereo target")]
#[test_case("Default", BusesLayout::simple(2, 2) ; "default sentinel negotiates freely")]
fn test_named_target_selects_layout(target: &str, expected: BusesLayout) {
    let chain = chain_with_unit(config(2, 2, 0), MockUnit::new("eq"));
    chain
        .add_stage("unit", LoadRequest::default().with_layout(target))
        .unwrap();
    assert_eq!(layout_of(&chain, 0), expected);
}

#[test]
fn test_named_target_prefers_widest_input() {
    let layouts = vec![
        BusesLayout::simple(1, 2),
        BusesLayout::new(vec![ChannelSet::Stereo, ChannelSet::Mono], vec![ChannelSet::Mono]),
        BusesLayout::new(vec![ChannelSet::Discrete(4)], vec![ChannelSet::Stereo]),
    ];
    let chain_layout = BusesLayout::simple(2, 2);
    let ctx = NegotiationContext::new(&chain_layout, Some("Stereo"));

    let (strategy, candidate) = select(&ctx, &layouts).unwrap();
    assert_eq!(strategy, Strategy::NamedTarget);
    assert_eq!(candidate.layout, layouts[2]);
}

#[test_case(2, 2, BusesLayout::simple(2, 2) ; "stereo chain")]
#[test_case(1, 1, BusesLayout::simple(1, 1) ; "mono chain")]
#[test_case(4, 2, BusesLayout::simple(2, 2) ; "quad in picks matching outputs")]
#[test_case(8, 8, BusesLayout::simple(2, 2) ; "wide chain falls back to best effort")]
fn test_reconfigure_renegotiates(channels_in: usize, channels_out: usize, expected: BusesLayout) {
    let chain = chain_with_unit(
        config(2, 2, 0),
        MockUnit::new("eq").with_layouts(vec![
            BusesLayout::simple(1, 1),
            BusesLayout::simple(2, 2),
        ]),
    );
    chain.add_stage("unit", LoadRequest::default()).unwrap();

    let degraded = chain.reconfigure_channels(channels_in, channels_out, 0).unwrap();

    assert!(degraded.is_empty());
    assert_eq!(chain.channels_in(), channels_in);
    assert_eq!(chain.channels_out(), channels_out);
    assert_eq!(layout_of(&chain, 0), expected);
}

#[test]
fn test_reconfigure_resets_sidechain_state() {
    let unit = MockUnit::new("comp").with_layouts(vec![BusesLayout::simple(2, 2)]);
    let chain = chain_with_unit(config(2, 2, 1), unit);
    chain.add_stage("unit", LoadRequest::default()).unwrap();
    assert!(chain.is_sidechain_disabled());

    chain.reconfigure_channels(2, 2, 0).unwrap();
    assert!(!chain.has_sidechain());
    assert!(!chain.is_sidechain_disabled());

    chain.reconfigure_channels(2, 2, 1).unwrap();
    assert!(chain.is_sidechain_disabled());
}

#[test]
fn test_reconfigure_reports_refused_layouts() {
    let unit = MockUnit::new("stubborn")
        .with_layouts(vec![BusesLayout::simple(2, 2), BusesLayout::simple(1, 1)])
        .refusing_layouts();
    let chain = chain_with_unit(config(2, 2, 0), unit);
    chain.add_stage("unit", LoadRequest::default()).unwrap();

    let degraded = chain.reconfigure_channels(1, 1, 0).unwrap();

    assert_eq!(degraded, vec![0]);
    assert_eq!(layout_of(&chain, 0), BusesLayout::simple(2, 2));
    assert_eq!(extras_of(&chain, 0), (1, 1));
}

#[test]
fn test_reconfigure_keeps_named_target() {
    let chain = chain_with_unit(config(2, 2, 0), MockUnit::new("eq"));
    chain
        .add_stage("unit", LoadRequest::default().with_layout("Mono"))
        .unwrap();

    chain.reconfigure_channels(2, 2, 1).unwrap();
    assert_eq!(layout_of(&chain, 0), BusesLayout::simple(1, 1));
}

#[test]
fn test_sidechain_discrete_bus_uses_sidechain_width() {
    let layout = BusesLayout::from_channel_counts(1, 2, 3);
    assert_eq!(
        layout.inputs,
        vec![ChannelSet::Mono, ChannelSet::Discrete(3)]
    );
    assert_eq!(layout.sidechain_channels(), 3);
    assert_eq!(layout.block_channels(), 4);
}
