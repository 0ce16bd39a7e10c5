//! Logged RSSI records.
//!
//! A record is one line of a raw capture log:
//!
//! ```text
//! timestamp,receiver,sender,rssi_0,rssi_1,rssi_2,sequence,label,description
//! 2022-07-02T12:16:15.685190,7,6,0,-52,0,132,0,I am not in between A and B
//! ```
//!
//! A channel value of exactly `0` means "no reading on this channel".

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;
use thiserror::Error;

/// Field separator of the logged form.
pub const FIELD_DELIMITER: char = ',';

/// Number of radio channels carried by every record.
pub const CHANNEL_COUNT: usize = 3;

/// Number of positional fields in a well-formed line.
pub const FIELD_COUNT: usize = 9;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Failure to turn a text line into a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("malformed record: expected 9 fields, got {actual}")]
    FieldCount { actual: usize },

    #[error("malformed record: invalid {field} '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("malformed record: invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("malformed record: not valid UTF-8 '{0}'")]
    Encoding(String),
}

/// Experimenter-assigned tag of the physical state at capture time.
///
/// Older logs store the pressed key (`a`, `enter`, ...), newer ones a small
/// integer code. Both vote the same way in the majority label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Code(i64),
    Key(String),
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(code) => Label::Code(code),
            Err(_) => Label::Key(s.to_string()),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Code(code) => write!(f, "{code}"),
            Label::Key(key) => f.write_str(key),
        }
    }
}

/// A single parsed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Capture time as logged (local, no offset)
    pub timestamp: NaiveDateTime,
    /// Device that measured the signal
    pub receiver_id: u32,
    /// Device that broadcast the signal
    pub sender_id: u32,
    /// One reading per channel, `0` when absent
    pub channel_values: [i32; CHANNEL_COUNT],
    /// Per-sender message counter
    pub sequence_number: u32,
    /// Physical-state tag used for majority voting
    pub label: Label,
    /// Human readable meaning of the label
    pub description: String,
}

impl Record {
    /// Parse one logged line.
    ///
    /// A tenth field is accepted for descriptions that themselves contain the
    /// delimiter; it is joined back onto the description.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT && fields.len() != FIELD_COUNT + 1 {
            return Err(RecordError::FieldCount {
                actual: fields.len(),
            });
        }

        let timestamp = parse_timestamp(fields[0])?;
        let receiver_id = parse_field(fields[1], "receiver id")?;
        let sender_id = parse_field(fields[2], "sender id")?;
        let channel_values = [
            parse_field(fields[3], "channel 0 value")?,
            parse_field(fields[4], "channel 1 value")?,
            parse_field(fields[5], "channel 2 value")?,
        ];
        let sequence_number = parse_field(fields[6], "sequence number")?;
        let label = Label::from(fields[7]);
        let description = fields[FIELD_COUNT - 1..].join(",").trim().to_string();

        Ok(Self {
            timestamp,
            receiver_id,
            sender_id,
            channel_values,
            sequence_number,
            label,
            description,
        })
    }

    /// Render the record in its logged form.
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Whether at least one channel carries a reading.
    pub fn has_reading(&self) -> bool {
        self.channel_values.iter().any(|&v| v != 0)
    }
}

impl FromStr for Record {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c0, c1, c2] = self.channel_values;
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.receiver_id,
            self.sender_id,
            c0,
            c1,
            c2,
            self.sequence_number,
            self.label,
            self.description
        )
    }
}

/// Line iterator over a capture log.
///
/// Unlike [`BufRead::lines`], a line that is not valid UTF-8 is reported as
/// a [`RecordError`] for that line only and reading carries on. Only failures
/// of the underlying reader are `Err`.
pub struct LogLines<R> {
    input: R,
    buf: Vec<u8>,
}

/// Iterate over the lines of a capture log, without line terminators.
pub fn log_lines<R: BufRead>(input: R) -> LogLines<R> {
    LogLines {
        input,
        buf: Vec::new(),
    }
}

impl<R: BufRead> Iterator for LogLines<R> {
    type Item = io::Result<Result<String, RecordError>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.input.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                let line = String::from_utf8(std::mem::take(&mut self.buf)).map_err(|e| {
                    RecordError::Encoding(String::from_utf8_lossy(e.as_bytes()).into_owned())
                });
                Some(Ok(line))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, RecordError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| RecordError::InvalidTimestamp(value.to_string()))
}

fn parse_field<T: FromStr>(value: &str, field: &'static str) -> Result<T, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidField {
        field,
        value: value.to_string(),
    })
}
