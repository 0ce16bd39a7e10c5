//! Trailing windows over the record history.
//!
//! Windows are taken either by record count or by elapsed time. Time windows
//! are anchored to the newest record in the view, not to the wall clock, so
//! replaying a log gives the same result as processing it live.

use crate::core::features::FeatureSet;
use crate::diagnostics::RunStats;
use crate::record::Record;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default capacity of the record history.
pub const DEFAULT_CAPACITY: usize = 50;

/// Shape of a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindowSpec {
    /// The last `count` records.
    Count { count: usize },
    /// Records newer than `seconds` before the newest record.
    Time { seconds: u64 },
}

impl WindowSpec {
    /// Default windows: 1, 5, 10 and 50 records, then 10 s, 30 s and 5 min.
    pub fn defaults() -> Vec<WindowSpec> {
        vec![
            WindowSpec::Count { count: 1 },
            WindowSpec::Count { count: 5 },
            WindowSpec::Count { count: 10 },
            WindowSpec::Count { count: 50 },
            WindowSpec::Time { seconds: 10 },
            WindowSpec::Time { seconds: 30 },
            WindowSpec::Time { seconds: 300 },
        ]
    }

    /// Column-name fragment, e.g. `last-5-records` or `last-5-minutes`.
    pub fn name(&self) -> String {
        match *self {
            WindowSpec::Count { count: 1 } => "last-1-record".to_string(),
            WindowSpec::Count { count } => format!("last-{count}-records"),
            WindowSpec::Time { seconds: 60 } => "last-1-minute".to_string(),
            WindowSpec::Time { seconds } if seconds > 60 && seconds % 60 == 0 => {
                format!("last-{}-minutes", seconds / 60)
            }
            WindowSpec::Time { seconds } => format!("last-{seconds}-seconds"),
        }
    }

    /// Span of a time window; `None` for count windows and for spans
    /// too large to represent.
    pub fn span(&self) -> Option<Duration> {
        match *self {
            WindowSpec::Count { .. } => None,
            WindowSpec::Time { seconds } => {
                i64::try_from(seconds).ok().and_then(Duration::try_seconds)
            }
        }
    }

    /// Single-record windows only get the basic feature set.
    pub fn feature_set(&self) -> FeatureSet {
        match self {
            WindowSpec::Count { count: 1 } => FeatureSet::Basic,
            _ => FeatureSet::Extended,
        }
    }
}

/// A named trailing-window filter paired with the features computed over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFilter {
    name: String,
    spec: WindowSpec,
    features: FeatureSet,
}

impl WindowFilter {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            name: spec.name(),
            spec,
            features: spec.feature_set(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    /// Select the trailing window of an ordered record view.
    pub fn apply<'a>(&self, records: &[&'a Record], stats: &RunStats) -> Vec<&'a Record> {
        match self.spec {
            WindowSpec::Count { count } => tail_by_count(records, count).to_vec(),
            WindowSpec::Time { .. } => {
                let window = match self.spec.span() {
                    Some(span) => tail_by_time(records, span),
                    None => records.to_vec(),
                };
                if window.len() < 2 && records.len() >= 2 {
                    let gap = records[records.len() - 1].timestamp
                        - records[records.len() - 2].timestamp;
                    tracing::warn!(
                        window = %self.name,
                        gap_ms = gap.num_milliseconds(),
                        "Filtered too much, possible gap in the capture stream"
                    );
                    stats.record_sparse_window();
                }
                window
            }
        }
    }
}

/// The last `min(count, len)` records, in order.
pub fn tail_by_count<'r, 'a>(records: &'r [&'a Record], count: usize) -> &'r [&'a Record] {
    &records[records.len().saturating_sub(count)..]
}

/// Records with `timestamp > newest - span`, in order.
///
/// A span reaching before the earliest representable time keeps every record.
pub fn tail_by_time<'a>(records: &[&'a Record], span: Duration) -> Vec<&'a Record> {
    let Some(newest) = records.last() else {
        return Vec::new();
    };
    let Some(threshold) = newest.timestamp.checked_sub_signed(span) else {
        return records.to_vec();
    };
    records
        .iter()
        .filter(|r| r.timestamp > threshold)
        .copied()
        .collect()
}

/// Bounded insertion-ordered history; the oldest record is evicted first.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    records: VecDeque<Record>,
    capacity: usize,
}

impl RecordBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting from the front until the capacity holds.
    pub fn push(&mut self, record: Record) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read-only view, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
