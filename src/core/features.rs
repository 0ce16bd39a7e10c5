//! Feature computation from record windows.
//!
//! Every window is reduced to one scalar per record (see [`Channel::select`])
//! and summarised by a fixed, ordered set of statistics. Statistics that need
//! more samples than the window holds are reported as undefined rather than
//! as errors.

use crate::core::channel::Channel;
use crate::diagnostics::RunStats;
use crate::record::{Label, Record};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

/// Which statistics a window produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSet {
    /// `label`, `mean`; meaningful for single-record windows
    Basic,
    /// all statistics
    Extended,
}

type Accessor = fn(&WindowStatistics) -> FeatureValue;

const BASIC_COLUMNS: &[(&str, Accessor)] = &[
    ("label", |s| FeatureValue::from(s.label.clone())),
    ("mean", |s| FeatureValue::from(s.mean)),
];

const EXTENDED_COLUMNS: &[(&str, Accessor)] = &[
    ("label", |s| FeatureValue::from(s.label.clone())),
    ("mean", |s| FeatureValue::from(s.mean)),
    ("geometric_mean", |s| FeatureValue::from(s.geometric_mean)),
    ("stdev", |s| FeatureValue::from(s.stdev)),
    ("median_grouped", |s| FeatureValue::from(s.median_grouped)),
    ("min_max_gap", |s| FeatureValue::from(s.min_max_gap)),
];

impl FeatureSet {
    fn columns(&self) -> &'static [(&'static str, Accessor)] {
        match self {
            FeatureSet::Basic => BASIC_COLUMNS,
            FeatureSet::Extended => EXTENDED_COLUMNS,
        }
    }

    /// Statistic names in output order, independent of any data.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns().iter().map(|(name, _)| *name)
    }

    /// Compute this set's features over a window.
    pub fn compute(&self, records: &[&Record], channel: Channel, stats: &RunStats) -> FeatureRow {
        let summary = WindowStatistics::compute(records, channel);
        summary.report_zero_values(stats);

        FeatureRow {
            entries: self
                .columns()
                .iter()
                .map(|(name, accessor)| (*name, accessor(&summary)))
                .collect(),
        }
    }
}

/// A single feature value; `Undefined` renders as an empty CSV field.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Label(Label),
    Undefined,
}

impl FeatureValue {
    /// Whether the value renders as a non-empty field.
    pub fn is_defined(&self) -> bool {
        match self {
            FeatureValue::Undefined => false,
            FeatureValue::Label(Label::Key(key)) => !key.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FeatureValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(FeatureValue::Undefined, FeatureValue::Number)
    }
}

impl From<Option<Label>> for FeatureValue {
    fn from(value: Option<Label>) -> Self {
        value.map_or(FeatureValue::Undefined, FeatureValue::Label)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(v) => write!(f, "{v}"),
            FeatureValue::Label(label) => write!(f, "{label}"),
            FeatureValue::Undefined => Ok(()),
        }
    }
}

/// Ordered statistic name to value mapping for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    entries: Vec<(&'static str, FeatureValue)>,
}

impl FeatureRow {
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FeatureValue)> {
        self.entries.iter().map(|(name, value)| (*name, value))
    }

    pub fn values(&self) -> impl Iterator<Item = &FeatureValue> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn into_values(self) -> impl Iterator<Item = FeatureValue> {
        self.entries.into_iter().map(|(_, value)| value)
    }

    pub fn is_complete(&self) -> bool {
        self.values().all(FeatureValue::is_defined)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every statistic of one window; `None` when there are too few samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStatistics {
    pub label: Option<Label>,
    pub mean: Option<f64>,
    pub geometric_mean: Option<f64>,
    pub stdev: Option<f64>,
    pub median_grouped: Option<f64>,
    pub min_max_gap: Option<f64>,
}

impl WindowStatistics {
    /// Summarise the records of a window.
    ///
    /// Records without a usable scalar are left out of every statistic,
    /// including the label vote.
    pub fn compute(records: &[&Record], channel: Channel) -> Self {
        let usable: Vec<(&Record, f64)> = records
            .iter()
            .filter_map(|r| channel.select(r).map(|v| (*r, v)))
            .collect();
        let values: Vec<f64> = usable.iter().map(|(_, v)| *v).collect();

        if values.is_empty() {
            return Self::default();
        }

        let label = majority_label(usable.iter().rev().map(|(r, _)| &r.label));
        let mean: f64 = values.iter().mean();
        let median = median_grouped(&values);

        if values.len() < 2 {
            return Self {
                label,
                mean: Some(mean),
                median_grouped: Some(median),
                ..Self::default()
            };
        }

        let stdev: f64 = values.iter().std_dev();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);

        Self {
            label,
            mean: Some(mean),
            geometric_mean: signed_geometric_mean(&values),
            stdev: Some(stdev),
            median_grouped: Some(median),
            min_max_gap: Some(max - min),
        }
    }

    fn report_zero_values(&self, stats: &RunStats) {
        let zeros: Vec<&str> = [
            ("mean", self.mean),
            ("stdev", self.stdev),
            ("median_grouped", self.median_grouped),
        ]
        .into_iter()
        .filter(|(_, v)| *v == Some(0.0))
        .map(|(name, _)| name)
        .collect();

        if !zeros.is_empty() {
            tracing::debug!(statistics = ?zeros, "Zero-valued statistic");
            stats.record_zero_statistic();
        }
    }
}

/// Most frequent label; ties go to the label met first in iteration order.
///
/// Callers pass labels newest first so ties favour the most recent record.
pub fn majority_label<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Option<Label> {
    let mut tally: Vec<(&Label, usize)> = Vec::new();
    for label in labels {
        match tally.iter_mut().find(|(seen, _)| *seen == label) {
            Some((_, count)) => *count += 1,
            None => tally.push((label, 1)),
        }
    }

    let mut best: Option<(&Label, usize)> = None;
    for (label, count) in tally {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Median of grouped data with unit class width, interpolated within the
/// class of the middle value. Must be called with at least one value.
pub fn median_grouped(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let x = sorted[n / 2];
    let below = sorted.partition_point(|&v| v < x);
    let equal = sorted[below..].partition_point(|&v| v <= x);

    let lower_bound = x - 0.5;
    lower_bound + (n as f64 / 2.0 - below as f64) / equal as f64
}

/// Geometric mean of same-signed values.
///
/// RSSI readings are negative, so all-negative input yields the negated
/// geometric mean of the magnitudes. Mixed signs or zeros are undefined.
pub fn signed_geometric_mean(values: &[f64]) -> Option<f64> {
    let sign = if values.iter().all(|&v| v > 0.0) {
        1.0
    } else if values.iter().all(|&v| v < 0.0) {
        -1.0
    } else {
        return None;
    };

    let magnitude: f64 = values.iter().map(|v| v.abs()).geometric_mean();
    Some(sign * magnitude)
}
