//! Core functionality of the RSSI feature pipeline.
//!
//! This module contains:
//! - Channel selection and channel filtering
//! - Trailing windows and the bounded record history
//! - Feature computation over a window
//! - The aggregator that combines all of the above into CSV rows

pub mod aggregator;
pub mod channel;
pub mod features;
pub mod windowing;

// Re-export commonly used types
pub use aggregator::{render_record, render_row, Aggregator, AggregatorError, LineOutcome};
pub use channel::{Channel, ChannelError, ChannelFilter};
pub use features::{FeatureRow, FeatureSet, FeatureValue, WindowStatistics};
pub use windowing::{RecordBuffer, WindowFilter, WindowSpec, DEFAULT_CAPACITY};
