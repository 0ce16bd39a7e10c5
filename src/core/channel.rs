//! Channel selection.
//!
//! A record carries up to three channel readings. Statistics are computed
//! over one scalar per record: either one concrete channel or the mean of
//! every channel that has a reading.

use crate::record::{Record, CHANNEL_COUNT};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Configuration error for a channel filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel id must be 0, 1 or 2, got {0}")]
    InvalidIndex(usize),

    #[error("unknown channel '{0}', expected 0, 1, 2 or \"all\"")]
    Unknown(String),
}

/// Which reading(s) of a record feed the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// A single channel; only indices below [`CHANNEL_COUNT`] are valid,
    /// see [`Channel::index`] and [`Channel::validate`].
    Index(usize),
    /// Mean of all non-zero channels.
    All,
}

impl Channel {
    /// Construct a concrete channel, rejecting out-of-range indices.
    pub fn index(index: usize) -> Result<Self, ChannelError> {
        if index < CHANNEL_COUNT {
            Ok(Channel::Index(index))
        } else {
            Err(ChannelError::InvalidIndex(index))
        }
    }

    /// Check a channel built directly from its variant.
    pub fn validate(self) -> Result<Self, ChannelError> {
        match self {
            Channel::Index(i) => Channel::index(i),
            Channel::All => Ok(Channel::All),
        }
    }

    /// The default channel set: every concrete channel, then all channels.
    pub fn defaults() -> Vec<Channel> {
        (0..CHANNEL_COUNT)
            .map(Channel::Index)
            .chain(std::iter::once(Channel::All))
            .collect()
    }

    /// Column-name prefix for this channel.
    pub fn name(&self) -> String {
        match self {
            Channel::Index(i) => format!("channel-{i}"),
            Channel::All => "all-channels".to_string(),
        }
    }

    /// Reduce a record to one scalar.
    ///
    /// A concrete channel returns its value even when it is zero. `All`
    /// averages the non-zero readings and yields `None` when there are none.
    /// An out-of-range index has no value.
    pub fn select(&self, record: &Record) -> Option<f64> {
        match *self {
            Channel::Index(i) => record.channel_values.get(i).map(|&v| f64::from(v)),
            Channel::All => {
                let readings: Vec<f64> = record
                    .channel_values
                    .iter()
                    .filter(|&&v| v != 0)
                    .map(|&v| f64::from(v))
                    .collect();
                if readings.is_empty() {
                    None
                } else {
                    Some(readings.iter().sum::<f64>() / readings.len() as f64)
                }
            }
        }
    }

    /// Whether the record has a reading on this channel.
    pub fn has_reading(&self, record: &Record) -> bool {
        match *self {
            Channel::Index(i) => record.channel_values.get(i).is_some_and(|&v| v != 0),
            Channel::All => record.has_reading(),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Channel::All);
        }
        match s.parse::<usize>() {
            Ok(index) => Channel::index(index),
            Err(_) => Err(ChannelError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Index(i) => write!(f, "{i}"),
            Channel::All => f.write_str("all"),
        }
    }
}

// Serialized as `0`, `1`, `2` or `"all"`.
impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Channel::Index(i) => serializer.serialize_u64(*i as u64),
            Channel::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(usize),
            Name(String),
        }

        let channel = match Raw::deserialize(deserializer)? {
            Raw::Index(i) => Channel::index(i),
            Raw::Name(name) => name.parse(),
        };
        channel.map_err(serde::de::Error::custom)
    }
}

/// Keeps only records that have a reading on the configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFilter {
    name: String,
    channel: Channel,
}

impl ChannelFilter {
    /// Build a filter, rejecting an out-of-range channel index.
    pub fn new(channel: Channel) -> Result<Self, ChannelError> {
        let channel = channel.validate()?;
        Ok(Self {
            name: channel.name(),
            channel,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Order-preserving selection of records with a non-zero reading.
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Vec<&'a Record> {
        records
            .into_iter()
            .filter(|r| self.channel.has_reading(r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Label;
    use chrono::NaiveDateTime;

    fn make_record(channel_values: [i32; 3]) -> Record {
        Record {
            timestamp: NaiveDateTime::default(),
            receiver_id: 1,
            sender_id: 2,
            channel_values,
            sequence_number: 0,
            label: Label::Code(0),
            description: String::new(),
        }
    }

    #[test]
    fn test_invalid_index_rejected() {
        assert_eq!(Channel::index(3), Err(ChannelError::InvalidIndex(3)));
        assert!("7".parse::<Channel>().is_err());
        assert!("north".parse::<Channel>().is_err());
        assert_eq!("all".parse::<Channel>(), Ok(Channel::All));
        assert_eq!("2".parse::<Channel>(), Ok(Channel::Index(2)));
    }

    #[test]
    fn test_filter_rejects_unchecked_index() {
        assert_eq!(
            ChannelFilter::new(Channel::Index(3)),
            Err(ChannelError::InvalidIndex(3))
        );
        assert_eq!(Channel::Index(2).validate(), Ok(Channel::Index(2)));
        assert_eq!(Channel::All.validate(), Ok(Channel::All));
    }

    #[test]
    fn test_out_of_range_index_has_no_value() {
        let record = make_record([-40, -41, -42]);
        assert_eq!(Channel::Index(7).select(&record), None);
        assert!(!Channel::Index(7).has_reading(&record));
    }

    #[test]
    fn test_select_concrete_channel_keeps_zero() {
        let record = make_record([0, -52, 0]);
        assert_eq!(Channel::Index(0).select(&record), Some(0.0));
        assert_eq!(Channel::Index(1).select(&record), Some(-52.0));
    }

    #[test]
    fn test_select_all_averages_non_zero() {
        assert_eq!(Channel::All.select(&make_record([-40, 0, -45])), Some(-42.5));
        assert_eq!(Channel::All.select(&make_record([0, 0, 0])), None);
    }

    #[test]
    fn test_channel_filter() {
        let records = vec![
            make_record([-40, 0, 0]),
            make_record([0, -50, 0]),
            make_record([0, 0, 0]),
            make_record([-41, -51, 0]),
        ];

        let ch0 = ChannelFilter::new(Channel::Index(0)).unwrap().apply(&records);
        assert_eq!(ch0.len(), 2);
        assert_eq!(ch0[1].channel_values, [-41, -51, 0]);

        let all = ChannelFilter::new(Channel::All).unwrap().apply(&records);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_names() {
        let names: Vec<String> = Channel::defaults().iter().map(Channel::name).collect();
        assert_eq!(
            names,
            vec!["channel-0", "channel-1", "channel-2", "all-channels"]
        );
    }

    #[test]
    fn test_serde_forms() {
        let channels: Vec<Channel> = serde_json::from_str(r#"[0, 2, "all"]"#).unwrap();
        assert_eq!(
            channels,
            vec![Channel::Index(0), Channel::Index(2), Channel::All]
        );
        assert!(serde_json::from_str::<Channel>("5").is_err());
        assert_eq!(serde_json::to_string(&Channel::All).unwrap(), r#""all""#);
    }
}
