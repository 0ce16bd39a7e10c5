//! RSSI Features - rolling statistics over labelled beacon recordings.
//!
//! This library turns a raw, irregularly spaced log of radio signal-strength
//! readings into a fixed-width feature table for supervised learning.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RSSI Features                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   │
//! │  │  Record  │──▶│ Channel  │──▶│  Window  │──▶│ Features │   │
//! │  │ (parse)  │   │ (filter) │   │ (filter) │   │ (compute)│   │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────────┘   │
//! │       │                                             │        │
//! │       ▼                                             ▼        │
//! │  ┌──────────┐                                ┌──────────┐    │
//! │  │  Record  │                                │   CSV    │    │
//! │  │  Buffer  │                                │   row    │    │
//! │  └──────────┘                                └──────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rssi_features::{Aggregator, Config};
//!
//! let mut aggregator = Aggregator::new(&Config::default()).unwrap();
//! let input = "2022-01-01T00:00:00,1,2,-40,0,0,1,0,roomA\n";
//! let mut output = Vec::new();
//! aggregator.run(input.as_bytes(), &mut output).unwrap();
//! ```

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod packet;
pub mod record;
pub mod select;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{
    Aggregator, AggregatorError, Channel, ChannelError, FeatureSet, FeatureValue, WindowSpec,
};
pub use diagnostics::{RunStats, RunSummary, SharedRunStats};
pub use packet::{NeighbourReading, PacketError};
pub use record::{Label, Record, RecordError};
pub use select::SenderReceiverFilter;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
