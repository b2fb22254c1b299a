//! Row record framing
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, whole record including this field)
//! +------------------+
//! | Tuple            | (tuple codec)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers the length field and the tuple bytes.

use std::io;

use super::checksum::{compute_checksum, verify_checksum};
use crate::tuple::{decode_tuple, encode_tuple, encoded_len, Tuple};

/// length + empty tuple (u16 count) + checksum
pub const MIN_RECORD_SIZE: usize = 4 + 2 + 4;

/// A single stored row
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub tuple: Tuple,
}

impl RowRecord {
    pub fn new(tuple: Tuple) -> Self {
        Self { tuple }
    }

    /// Serializes the framed record
    pub fn serialize(&self) -> Vec<u8> {
        let record_length = (4 + encoded_len(&self.tuple) + 4) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        encode_tuple(&self.tuple, &mut record);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Deserializes one framed record, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let body_end = record_length - 4;
        let stored = u32::from_le_bytes([
            data[body_end],
            data[body_end + 1],
            data[body_end + 2],
            data[body_end + 3],
        ]);
        if !verify_checksum(&data[..body_end], stored) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Checksum mismatch",
            ));
        }

        let (tuple, used) = decode_tuple(&data[4..body_end])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        if used != body_end - 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Trailing bytes in record body: {}", body_end - 4 - used),
            ));
        }

        Ok((Self { tuple }, record_length))
    }
}
