//! Two-level index file format
//!
//! ```text
//! +-----------------------------------------------------------------+
//! | Header                                                          |
//! |   magic "TLIX" | version u16 | load_factor u32 | entry_count u64 |
//! |   top_count u64 | top_len u64 | bottom_len u64                   |
//! |   key schema: u16 n, n x (name: u32 len + UTF-8, type tag u8)   |
//! |   sort specs: u16 n, n x (column u16, ascending u8, nulls u8)   |
//! |   crc32 over all preceding header bytes                         |
//! +-----------------------------------------------------------------+
//! | Top level: top_count x (key tuple, bottom byte offset u64)      |
//! | crc32 over the top level                                        |
//! +-----------------------------------------------------------------+
//! | Bottom level: entry_count x (key tuple, data offset u64)        |
//! | crc32 over the bottom level                                     |
//! +-----------------------------------------------------------------+
//! ```
//!
//! All integers are little endian. `top_len` and `bottom_len` exclude the
//! trailing checksums. Bottom byte offsets in the top level are relative to
//! the start of the bottom level. Keys use the row storage tuple codec.

use std::io::{self, Read};

use crc32fast::Hasher;

use super::errors::{IndexError, IndexResult};
use crate::tuple::{put_string, DataType, Schema, SortSpec};

pub const MAGIC: [u8; 4] = *b"TLIX";
pub const VERSION: u16 = 1;

/// Bytes of the header before the key schema
pub const FIXED_HEADER_LEN: usize = 4 + 2 + 4 + 8 + 8 + 8 + 8;

/// Length of a section checksum
pub const CHECKSUM_LEN: u64 = 4;

/// Upper bound on a column name read from a header
const MAX_NAME_LEN: usize = 64 * 1024;

/// Decoded index header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub load_factor: u32,
    pub entry_count: u64,
    pub top_count: u64,
    pub top_len: u64,
    pub bottom_len: u64,
    pub key_schema: Schema,
    pub sort_specs: Vec<SortSpec>,
}

impl IndexHeader {
    /// Number of bottom blocks (and top-level entries) for `entry_count`
    /// entries grouped `load_factor` at a time
    pub fn expected_top_count(entry_count: u64, load_factor: u32) -> u64 {
        let lf = u64::from(load_factor.max(1));
        (entry_count + lf - 1) / lf
    }

    /// Serializes the header including its trailing checksum.
    ///
    /// Sort spec columns are stored as positions in the key schema.
    pub fn encode(&self) -> IndexResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(FIXED_HEADER_LEN + 64);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&self.load_factor.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        buf.extend_from_slice(&self.top_count.to_le_bytes());
        buf.extend_from_slice(&self.top_len.to_le_bytes());
        buf.extend_from_slice(&self.bottom_len.to_le_bytes());

        buf.extend_from_slice(&(self.key_schema.len() as u16).to_le_bytes());
        for column in self.key_schema.columns() {
            put_string(&mut buf, &column.name);
            buf.push(column.data_type.tag());
        }

        buf.extend_from_slice(&(self.sort_specs.len() as u16).to_le_bytes());
        for spec in &self.sort_specs {
            let position = self
                .key_schema
                .index_of(&spec.column)
                .map_err(|e| IndexError::invalid_key(e.to_string()))?;
            buf.extend_from_slice(&(position as u16).to_le_bytes());
            buf.push(u8::from(spec.ascending));
            buf.push(u8::from(spec.nulls_first));
        }

        let mut hasher = Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(buf)
    }

    /// Reads and verifies a header from the front of `reader`.
    ///
    /// Returns the header and its encoded length including the checksum.
    pub fn read_from<R: Read>(reader: &mut R) -> IndexResult<(Self, u64)> {
        let mut src = ChecksummedRead::new(reader);

        let magic = src.read_array::<4>()?;
        if magic != MAGIC {
            return Err(IndexError::corruption_at_offset(0, "Bad magic: not a two-level index file"));
        }
        let version = src.read_u16()?;
        if version != VERSION {
            return Err(IndexError::corruption_at_offset(
                4,
                format!("Unsupported index version {} (expected {})", version, VERSION),
            ));
        }

        let load_factor = src.read_u32()?;
        let entry_count = src.read_u64()?;
        let top_count = src.read_u64()?;
        let top_len = src.read_u64()?;
        let bottom_len = src.read_u64()?;

        let column_count = src.read_u16()? as usize;
        let mut key_schema = Schema::empty();
        for _ in 0..column_count {
            let name = src.read_name()?;
            let tag = src.read_u8()?;
            let data_type = DataType::from_tag(tag).ok_or_else(|| {
                IndexError::corruption_at_offset(
                    src.consumed - 1,
                    format!("Unknown column type tag {}", tag),
                )
            })?;
            key_schema.add_column(name, data_type);
        }

        let spec_count = src.read_u16()? as usize;
        let mut sort_specs = Vec::with_capacity(spec_count);
        for _ in 0..spec_count {
            let position = src.read_u16()? as usize;
            let ascending = src.read_u8()? != 0;
            let nulls_first = src.read_u8()? != 0;
            let column = key_schema.column(position).ok_or_else(|| {
                IndexError::corruption(format!(
                    "Sort spec refers to key column {} of {}",
                    position,
                    key_schema.len()
                ))
            })?;
            sort_specs.push(SortSpec::new(column.name.clone(), ascending, nulls_first));
        }

        let computed = src.hasher.clone().finalize();
        let header_end = src.consumed;
        let stored = u32::from_le_bytes(src.read_array::<4>()?);
        if stored != computed {
            return Err(IndexError::corruption_at_offset(
                header_end,
                "Header checksum mismatch",
            ));
        }

        if load_factor == 0 {
            return Err(IndexError::corruption("Load factor is zero"));
        }
        if top_count != Self::expected_top_count(entry_count, load_factor) {
            return Err(IndexError::corruption(format!(
                "Top level has {} entries, {} entries at load factor {} need {}",
                top_count,
                entry_count,
                load_factor,
                Self::expected_top_count(entry_count, load_factor)
            )));
        }
        if key_schema.is_empty() || sort_specs.is_empty() {
            return Err(IndexError::corruption("Index header has no key columns"));
        }

        let header = IndexHeader {
            load_factor,
            entry_count,
            top_count,
            top_len,
            bottom_len,
            key_schema,
            sort_specs,
        };
        Ok((header, src.consumed))
    }

    /// Total file length implied by this header
    pub fn file_len(&self, header_len: u64) -> u64 {
        header_len + self.top_len + CHECKSUM_LEN + self.bottom_len + CHECKSUM_LEN
    }
}

/// Reader adapter that hashes every byte it hands out
struct ChecksummedRead<'r, R: Read> {
    inner: &'r mut R,
    hasher: Hasher,
    consumed: u64,
}

impl<'r, R: Read> ChecksummedRead<'r, R> {
    fn new(inner: &'r mut R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            consumed: 0,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> IndexResult<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                IndexError::corruption_at_offset(self.consumed, "Index header truncated")
            } else {
                IndexError::io_error("Failed to read index header", e)
            }
        })?;
        self.hasher.update(buf);
        self.consumed += buf.len() as u64;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> IndexResult<[u8; N]> {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }

    fn read_u8(&mut self) -> IndexResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u16(&mut self) -> IndexResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> IndexResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> IndexResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_name(&mut self) -> IndexResult<String> {
        let at = self.consumed;
        let len = self.read_u32()? as usize;
        if len > MAX_NAME_LEN {
            return Err(IndexError::corruption_at_offset(
                at,
                format!("Column name length {} exceeds {}", len, MAX_NAME_LEN),
            ));
        }
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|_| IndexError::corruption_at_offset(at, "Column name is not UTF-8"))
    }
}
