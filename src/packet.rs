//! Decoding of raw neighbour-RSSI payloads.
//!
//! The radio link delivers fixed 8-byte payloads:
//!
//! ```text
//! [type, receiver, sender, rssi_0, rssi_1, rssi_2, reserved, sequence]
//! ```
//!
//! RSSI bytes are two's-complement signed values.

use crate::record::{Label, Record, CHANNEL_COUNT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expected payload length in bytes.
pub const PAYLOAD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("faulty payload: expected 8 bytes, got {0}")]
    Length(usize),
}

/// One decoded radio measurement, not yet timestamped or labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighbourReading {
    pub receiver_id: u8,
    pub sender_id: u8,
    pub channel_values: [i8; CHANNEL_COUNT],
    pub sequence_number: u8,
}

impl NeighbourReading {
    /// Decode a raw payload.
    pub fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() != PAYLOAD_LEN {
            return Err(PacketError::Length(payload.len()));
        }

        Ok(Self {
            receiver_id: payload[1],
            sender_id: payload[2],
            channel_values: [payload[3] as i8, payload[4] as i8, payload[5] as i8],
            sequence_number: payload[7],
        })
    }

    /// Attach capture time and the current label, producing a loggable record.
    pub fn into_record(
        self,
        timestamp: NaiveDateTime,
        label: Label,
        description: impl Into<String>,
    ) -> Record {
        Record {
            timestamp,
            receiver_id: self.receiver_id.into(),
            sender_id: self.sender_id.into(),
            channel_values: self.channel_values.map(i32::from),
            sequence_number: self.sequence_number.into(),
            label,
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_signed_bytes() {
        let reading = NeighbourReading::decode(&[0, 7, 6, 0, 0xCC, 0xFF, 0, 132]).unwrap();
        assert_eq!(reading.receiver_id, 7);
        assert_eq!(reading.sender_id, 6);
        assert_eq!(reading.channel_values, [0, -52, -1]);
        assert_eq!(reading.sequence_number, 132);
    }

    #[test]
    fn test_decode_wrong_length() {
        assert_eq!(
            NeighbourReading::decode(&[0, 1, 2]),
            Err(PacketError::Length(3))
        );
    }

    #[test]
    fn test_into_record_formats_as_log_line() {
        let reading = NeighbourReading::decode(&[0, 7, 6, 0, 0xCC, 0, 0, 132]).unwrap();
        let timestamp =
            NaiveDateTime::parse_from_str("2022-07-02T12:16:15", "%Y-%m-%dT%H:%M:%S").unwrap();
        let record = reading.into_record(timestamp, Label::Code(1), "I am in between A and B");
        assert_eq!(
            record.format(),
            "2022-07-02T12:16:15,7,6,0,-52,0,132,1,I am in between A and B"
        );
    }
}
