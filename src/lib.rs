//! fxchain - Audio Effect Chain Orchestration
//!
//! fxchain hosts an ordered sequence of processing stages (plugin
//! instances) and routes each audio block through them in order.
//!
//! # Architecture
//!
//! - [`Chain`]: ordered stages, live mutation alongside block processing
//! - [`negotiation`]: picks a channel layout for every stage
//! - [`preroll`]: settles a new stage with silent blocks before it goes live
//! - [`stage`]: the [`Stage`] seam to the plugin-hosting layer
//!
//! ```
//! use std::sync::Arc;
//! use fxchain::stage::mock::MockFactory;
//! use fxchain::{Chain, ChainConfig, LoadRequest};
//!
//! let chain = Chain::new(ChainConfig::default(), Arc::new(MockFactory::new())).unwrap();
//! chain.add_stage("mock:comp:64", LoadRequest::default()).unwrap();
//! chain.add_stage("mock:verb:0:2.5", LoadRequest::default()).unwrap();
//!
//! assert_eq!(chain.summary(), "comp > verb");
//! assert_eq!(chain.latency_samples(), 64);
//! ```

pub mod chain;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod negotiation;
pub mod preroll;
pub mod stage;

pub use chain::{AddStageReport, Chain, LatencyListener};
pub use config::ChainConfig;
pub use engine::{AudioBuffer, MidiBuffer, MidiEvent, Sample};
pub use error::{ChainError, Result};
pub use layout::{BusesLayout, ChannelSet};
pub use stage::{LoadRequest, ProcessingPrecision, Stage, StageFactory, StageSample};
