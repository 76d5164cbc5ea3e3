//! Chain Integration Tests
//!
//! End-to-end tests for stage bookkeeping through the public API.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;

use fxchain::stage::mock::{MockFactory, MockUnit};
use fxchain::{AudioBuffer, BusesLayout, Chain, ChainConfig, LoadRequest, MidiBuffer, MidiEvent};

/// Small blocks keep the tests fast
fn test_config() -> ChainConfig {
    ChainConfig::default().with_block_size(64)
}

fn chain(factory: MockFactory) -> Chain {
    Chain::new(test_config(), Arc::new(factory)).unwrap()
}

fn assert_indices(chain: &Chain) {
    for i in 0..chain.len() {
        assert_eq!(chain.with_stage(i, |s| s.chain_index()), Some(i));
    }
}

fn process(chain: &Chain) {
    let mut buffer = AudioBuffer::<f32>::new(2, 64);
    chain.process_block(&mut buffer, &mut MidiBuffer::new());
}

// === Ordering ===

#[test]
fn test_indices_follow_every_mutation() {
    let chain = chain(MockFactory::new());
    for name in ["a", "b", "c", "d", "e"] {
        chain
            .add_stage(&format!("mock:{}", name), LoadRequest::default())
            .unwrap();
        assert_indices(&chain);
    }

    chain.swap_stages(0, 4).unwrap();
    assert_indices(&chain);
    chain.remove_stage(1).unwrap();
    assert_indices(&chain);
    chain.swap_stages(2, 1).unwrap();
    assert_indices(&chain);
    chain.remove_stage(0).unwrap();
    assert_indices(&chain);

    assert_eq!(chain.stage_names(), vec!["d", "c", "a"]);
}

#[test]
fn test_swap_twice_restores_order() {
    let chain = chain(MockFactory::new());
    for id in ["mock:a:0:1.0", "mock:b:0:2.0", "mock:c:0:3.0"] {
        chain.add_stage(id, LoadRequest::default()).unwrap();
    }
    let before = chain.stage_names();

    chain.swap_stages(0, 2).unwrap();
    assert_eq!(chain.stage_names(), vec!["c", "b", "a"]);
    chain.swap_stages(0, 2).unwrap();

    assert_eq!(chain.stage_names(), before);
    assert_indices(&chain);
    assert_relative_eq!(chain.tail_length_seconds(), 3.0);
}

#[test]
fn test_out_of_range_mutations_are_noops() {
    let chain = chain(MockFactory::new());
    chain.add_stage("mock:a:10", LoadRequest::default()).unwrap();

    assert!(chain.remove_stage(1).is_err());
    assert!(chain.swap_stages(0, 1).is_err());
    assert!(chain.set_bypassed(2, true).is_err());
    assert!(chain.parameter_value(1, 0).is_err());
    assert!(chain.with_stage(1, |_| ()).is_none());

    assert_eq!(chain.len(), 1);
    assert_eq!(chain.latency_samples(), 10);
}

#[test]
fn test_remove_middle_stage() {
    let chain = chain(MockFactory::new());
    chain.add_stage("mock:a:10", LoadRequest::default()).unwrap();
    chain.add_stage("mock:b:25", LoadRequest::default()).unwrap();
    chain.add_stage("mock:c:40", LoadRequest::default()).unwrap();
    assert_eq!(chain.latency_samples(), 75);

    chain.remove_stage(1).unwrap();

    assert_eq!(chain.stage_names(), vec!["a", "c"]);
    assert_eq!(chain.with_stage(1, |s| s.name().to_string()).unwrap(), "c");
    assert_indices(&chain);
    assert_eq!(chain.latency_samples(), 50);
}

#[test]
fn test_remove_unloads_stage() {
    let mut factory = MockFactory::new();
    let probe = factory.register("verb", MockUnit::new("verb"));
    let chain = chain(factory);
    chain.add_stage("verb", LoadRequest::default()).unwrap();
    assert_eq!(probe.unload_count(), 0);

    chain.remove_stage(0).unwrap();
    assert_eq!(probe.unload_count(), 1);
    assert!(chain.is_empty());
}

// === Latency ===

#[test]
fn test_latency_follows_stage_changes() {
    let mut factory = MockFactory::new();
    let probe = factory.register("look", MockUnit::new("look").with_latency(100));
    let chain = chain(factory);
    chain.add_stage("look", LoadRequest::default()).unwrap();
    chain.add_stage("mock:eq:20", LoadRequest::default()).unwrap();
    assert_eq!(chain.latency_samples(), 120);

    probe.set_latency(300);
    process(&chain);
    assert_eq!(chain.latency_samples(), 320);

    probe.set_latency(50);
    chain.update();
    assert_eq!(chain.latency_samples(), 70);
}

#[test]
fn test_stage_that_did_not_run_adds_no_latency() {
    let mut factory = MockFactory::new();
    let probe = factory.register("flaky", MockUnit::new("flaky").with_latency(64));
    let chain = chain(factory);
    chain.add_stage("flaky", LoadRequest::default()).unwrap();
    chain.add_stage("mock:eq:16", LoadRequest::default()).unwrap();

    probe.set_fail_processing(true);
    process(&chain);
    assert_eq!(chain.latency_samples(), 16);

    probe.set_fail_processing(false);
    process(&chain);
    assert_eq!(chain.latency_samples(), 80);
}

#[test]
fn test_bypassed_stage_contributes_no_latency() {
    let chain = chain(MockFactory::new());
    chain.add_stage("mock:a:30", LoadRequest::default()).unwrap();
    chain.add_stage("mock:b:12", LoadRequest::default()).unwrap();

    chain.set_bypassed(0, true).unwrap();
    assert_eq!(chain.latency_samples(), 12);
    process(&chain);
    assert_eq!(chain.latency_samples(), 12);

    chain.set_bypassed(0, false).unwrap();
    assert_eq!(chain.latency_samples(), 42);
}

#[test]
fn test_latency_listener_fires_once_per_change() {
    let mut factory = MockFactory::new();
    let probe = factory.register("look", MockUnit::new("look"));
    let chain = chain(factory);

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    chain.set_latency_listener(move |latency| sink.lock().unwrap().push(latency));

    chain.add_stage("look", LoadRequest::default()).unwrap();
    probe.set_latency(128);
    for _ in 0..5 {
        process(&chain);
    }
    chain.update();

    assert_eq!(*reports.lock().unwrap(), vec![128]);
}

#[test]
fn test_pre_roll_settles_latency_before_insertion() {
    let mut factory = MockFactory::new();
    let probe = factory.register(
        "lookahead",
        MockUnit::new("lookahead").with_latency(256).settling_after(2048),
    );
    let config = ChainConfig {
        block_size: 256,
        ..ChainConfig::default()
    };
    let chain = Chain::new(config, Arc::new(factory)).unwrap();

    let report = chain.add_stage("lookahead", LoadRequest::default()).unwrap();

    assert_eq!(report.latency_samples, 256);
    assert_eq!(probe.frames_processed(), 16384);
    assert_eq!(probe.last_block_channels(), 2);
}

#[test]
fn test_pre_roll_never_below_minimum() {
    let mut factory = MockFactory::new();
    let probe = factory.register("eq", MockUnit::new("eq"));
    let chain = chain(factory);
    chain.add_stage("eq", LoadRequest::default()).unwrap();
    assert_eq!(probe.frames_processed(), 16384);

    let short = ChainConfig {
        pre_roll_samples: 512,
        ..test_config()
    };
    let err = Chain::new(short, Arc::new(MockFactory::new())).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_CONFIG");
}

// === Tail ===

#[test]
fn test_tail_follows_last_active_stage() {
    let chain = chain(MockFactory::new());
    chain.add_stage("mock:verb:0:4.0", LoadRequest::default()).unwrap();
    chain.add_stage("mock:delay:0:1.5", LoadRequest::default()).unwrap();
    chain.add_stage("mock:eq:0:0.25", LoadRequest::default()).unwrap();
    assert_relative_eq!(chain.tail_length_seconds(), 0.25);

    chain.set_bypassed(2, true).unwrap();
    assert_relative_eq!(chain.tail_length_seconds(), 1.5);
    chain.set_bypassed(1, true).unwrap();
    assert_relative_eq!(chain.tail_length_seconds(), 4.0);
    chain.set_bypassed(0, true).unwrap();
    assert_eq!(chain.tail_length_seconds(), 0.0);

    chain.set_bypassed(1, false).unwrap();
    assert_relative_eq!(chain.tail_length_seconds(), 1.5);
}

#[test]
fn test_empty_chain_has_no_tail() {
    let chain = chain(MockFactory::new());
    assert_eq!(chain.tail_length_seconds(), 0.0);
    chain.add_stage("mock:verb:0:2.0", LoadRequest::default()).unwrap();
    chain.clear();
    assert_eq!(chain.tail_length_seconds(), 0.0);
}

// === Processing ===

#[test]
fn test_every_active_stage_processes_block() {
    let mut factory = MockFactory::new();
    let half = factory.register("half", MockUnit::new("half").with_gain(0.5));
    let quarter = factory.register("quarter", MockUnit::new("quarter").with_gain(0.25));
    let chain = chain(factory);
    chain.add_stage("half", LoadRequest::default()).unwrap();
    chain.add_stage("quarter", LoadRequest::default()).unwrap();
    let half_before = half.blocks_processed();
    let quarter_before = quarter.blocks_processed();

    let mut buffer = AudioBuffer::<f32>::new(2, 64);
    buffer.fill(1.0);
    let mut midi = MidiBuffer::new();
    midi.push(MidiEvent::note_on(0, 0, 60, 100));
    chain.process_block(&mut buffer, &mut midi);

    assert_relative_eq!(buffer.peak(0), 0.125);
    assert_eq!(half.blocks_processed(), half_before + 1);
    assert_eq!(quarter.blocks_processed(), quarter_before + 1);
    assert_eq!(midi.len(), 1);
}

#[test]
fn test_bypassed_stage_passes_signal_through() {
    let chain = chain(
        MockFactory::new().with_unit("cut", MockUnit::new("cut").with_gain(0.0)),
    );
    chain.add_stage("cut", LoadRequest::default()).unwrap();
    chain.set_bypassed(0, true).unwrap();

    let mut buffer = AudioBuffer::<f32>::new(2, 64);
    buffer.fill(0.5);
    chain.process_block(&mut buffer, &mut MidiBuffer::new());
    assert_relative_eq!(buffer.peak(1), 0.5);
}

#[test]
fn test_disabled_sidechain_is_silenced() {
    let plain = MockUnit::new("plain").with_layouts(vec![BusesLayout::simple(2, 2)]);
    let factory = MockFactory::new().with_unit("plain", plain);
    let chain = Chain::new(config_with_sidechain(), Arc::new(factory)).unwrap();
    chain.add_stage("plain", LoadRequest::default()).unwrap();
    assert!(chain.is_sidechain_disabled());

    let mut buffer = AudioBuffer::<f32>::new(3, 64);
    buffer.fill(1.0);
    chain.process_block(&mut buffer, &mut MidiBuffer::new());

    assert_relative_eq!(buffer.peak(0), 1.0);
    assert_relative_eq!(buffer.peak(1), 1.0);
    assert_eq!(buffer.peak(2), 0.0);
}

fn config_with_sidechain() -> ChainConfig {
    test_config().with_channels(2, 2, 1)
}

#[test]
fn test_live_sidechain_is_left_alone() {
    let chain = Chain::new(config_with_sidechain(), Arc::new(MockFactory::new())).unwrap();
    chain.add_stage("mock:ducker", LoadRequest::default()).unwrap();
    assert!(!chain.is_sidechain_disabled());

    let mut buffer = AudioBuffer::<f32>::new(3, 64);
    buffer.fill(1.0);
    chain.process_block(&mut buffer, &mut MidiBuffer::new());
    assert_relative_eq!(buffer.peak(2), 1.0);
}

#[test]
fn test_double_precision_processing() {
    let mut factory = MockFactory::new();
    let probe = factory.register("hq", MockUnit::new("hq").with_gain(0.5));
    let config = test_config().with_double_precision(true);
    let chain = Chain::new(config, Arc::new(factory)).unwrap();
    chain.add_stage("hq", LoadRequest::default()).unwrap();
    let before = probe.blocks_processed();

    let mut buffer = AudioBuffer::<f64>::new(2, 64);
    buffer.fill(1.0);
    chain.process_block(&mut buffer, &mut MidiBuffer::new());

    assert_relative_eq!(buffer.peak(0), 0.5);
    assert_eq!(probe.blocks_processed(), before + 1);
}

// === Reports and summary ===

#[test]
fn test_add_stage_reports_sidechain_disable_once() {
    let plain = MockUnit::new("plain").with_layouts(vec![BusesLayout::simple(2, 2)]);
    let factory = MockFactory::new().with_unit("plain", plain);
    let chain = Chain::new(config_with_sidechain(), Arc::new(factory)).unwrap();

    let first = chain.add_stage("plain", LoadRequest::default()).unwrap();
    let second = chain.add_stage("plain", LoadRequest::default()).unwrap();

    assert!(first.sidechain_newly_disabled);
    assert!(!second.sidechain_newly_disabled);
}

#[test]
fn test_summary_renders_bypassed_stages() {
    let chain = chain(MockFactory::new());
    for id in ["mock:gate", "mock:comp", "mock:verb"] {
        chain.add_stage(id, LoadRequest::new("{\"preset\":1}")).unwrap();
    }
    chain.set_bypassed(1, true).unwrap();

    assert_eq!(chain.to_string(), "gate > <bypassed> > verb");
}

#[test]
fn test_clear_empties_chain() {
    let chain = chain(MockFactory::new());
    chain.add_stage("mock:a:10:1.0", LoadRequest::default()).unwrap();
    chain.add_stage("mock:b:5", LoadRequest::default()).unwrap();

    chain.clear();

    assert!(chain.is_empty());
    assert_eq!(chain.latency_samples(), 0);
    assert_eq!(chain.summary(), "");
    chain.add_stage("mock:c", LoadRequest::default()).unwrap();
    assert_indices(&chain);
}
