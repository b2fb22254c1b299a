//! Binary tuple codec
//!
//! Shared by row storage and the two-level index (keys are encoded with
//! exactly the same bytes as persisted rows).
//!
//! ```text
//! +---------------------+
//! | Value Count (u16 LE)|
//! +---------------------+
//! | Tag (u8) | Payload  |  repeated Value Count times
//! +---------------------+
//! ```
//!
//! Payloads: Null none, Bool u8, Int4 i32 LE, Int8 i64 LE, Float8 f64 bits LE,
//! Text u32 LE length + UTF-8 bytes.

use super::datum::Datum;
use super::errors::{TupleError, TupleResult};
use super::row::Tuple;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT4: u8 = 2;
const TAG_INT8: u8 = 3;
const TAG_FLOAT8: u8 = 4;
const TAG_TEXT: u8 = 5;

/// Appends the encoding of `tuple` to `buf`
pub fn encode_tuple(tuple: &Tuple, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(tuple.len() as u16).to_le_bytes());
    for value in tuple.values() {
        match value {
            Datum::Null => buf.push(TAG_NULL),
            Datum::Bool(b) => {
                buf.push(TAG_BOOL);
                buf.push(u8::from(*b));
            }
            Datum::Int4(v) => {
                buf.push(TAG_INT4);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Datum::Int8(v) => {
                buf.push(TAG_INT8);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Datum::Float8(v) => {
                buf.push(TAG_FLOAT8);
                buf.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            Datum::Text(s) => {
                buf.push(TAG_TEXT);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }
}

/// Number of bytes `encode_tuple` produces
pub fn encoded_len(tuple: &Tuple) -> usize {
    2 + tuple
        .values()
        .iter()
        .map(|v| match v {
            Datum::Null => 1,
            Datum::Bool(_) => 2,
            Datum::Int4(_) => 5,
            Datum::Int8(_) | Datum::Float8(_) => 9,
            Datum::Text(s) => 5 + s.len(),
        })
        .sum::<usize>()
}

/// Decodes one tuple from the front of `data`.
///
/// Returns the tuple and the number of bytes consumed.
pub fn decode_tuple(data: &[u8]) -> TupleResult<(Tuple, usize)> {
    let mut reader = ByteReader::new(data);
    let tuple = reader.read_tuple()?;
    Ok((tuple, reader.position()))
}

/// Bounds-checked little-endian cursor over a byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_bytes(&mut self, n: usize) -> TupleResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(TupleError::Truncated {
                needed: n,
                at: self.pos,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> TupleResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> TupleResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> TupleResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> TupleResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> TupleResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_string(&mut self) -> TupleResult<String> {
        let len = self.read_u32()? as usize;
        let start = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| TupleError::InvalidUtf8(start))
    }

    pub fn read_datum(&mut self) -> TupleResult<Datum> {
        let tag = self.read_u8()?;
        let datum = match tag {
            TAG_NULL => Datum::Null,
            TAG_BOOL => Datum::Bool(self.read_u8()? != 0),
            TAG_INT4 => Datum::Int4(i32::from_le_bytes(self.read_array()?)),
            TAG_INT8 => Datum::Int8(i64::from_le_bytes(self.read_array()?)),
            TAG_FLOAT8 => Datum::Float8(f64::from_bits(u64::from_le_bytes(self.read_array()?))),
            TAG_TEXT => Datum::Text(self.read_string()?),
            other => return Err(TupleError::InvalidTag(other)),
        };
        Ok(datum)
    }

    pub fn read_tuple(&mut self) -> TupleResult<Tuple> {
        let count = self.read_u16()? as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_datum()?);
        }
        Ok(Tuple::new(values))
    }
}

/// Appends a length-prefixed UTF-8 string (u32 LE length)
pub(crate) fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}
