//! Two-level index reader
//!
//! `open` verifies the whole file (header, directory consistency and all
//! three checksums) and keeps the header and top level in memory. Lookups
//! binary-search the top level to pick a bottom block, read that single
//! block from disk and binary-search it.
//!
//! The reader is immutable after `open` and is `Send + Sync`: block reads
//! seek a shared file handle under a mutex, so concurrent lookups through an
//! `Arc<TwoLevelIndexReader>` are safe.

use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crc32fast::Hasher;

use super::errors::{IndexError, IndexResult};
use super::format::{IndexHeader, CHECKSUM_LEN};
use crate::observability::{log_event_with_fields, Event};
use crate::tuple::{ByteReader, Schema, SortSpec, Tuple, TupleComparator};

const VERIFY_CHUNK: usize = 64 * 1024;

/// Ordinal of an entry in key order.
///
/// Entry `n` lives in bottom block `n / load_factor` at slot
/// `n % load_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPosition(pub u64);

impl IndexPosition {
    pub fn ordinal(self) -> u64 {
        self.0
    }

    /// Position immediately after this one
    pub fn next(self) -> Self {
        IndexPosition(self.0 + 1)
    }
}

/// A matching entry and where it was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHit {
    pub position: IndexPosition,
    pub offset: u64,
}

/// One decoded (key, data offset) pair
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub key: Tuple,
    pub offset: u64,
}

struct TopEntry {
    key: Tuple,
    block_offset: u64,
}

pub struct TwoLevelIndexReader {
    path: PathBuf,
    header: IndexHeader,
    comparator: TupleComparator,
    top: Vec<TopEntry>,
    bottom_start: u64,
    file: Mutex<File>,
}

impl fmt::Debug for TwoLevelIndexReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoLevelIndexReader")
            .field("path", &self.path)
            .field("entries", &self.header.entry_count)
            .field("top_entries", &self.top.len())
            .field("key_schema", &self.header.key_schema)
            .finish()
    }
}

impl TwoLevelIndexReader {
    /// Opens and fully verifies an index file
    pub fn open(path: &Path) -> IndexResult<Self> {
        let file = File::open(path).map_err(|e| {
            IndexError::io_error(format!("Failed to open index file: {}", path.display()), e)
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| IndexError::io_error("Failed to read index file metadata", e))?
            .len();

        let mut reader = BufReader::new(file);
        let (header, header_len) = IndexHeader::read_from(&mut reader)?;

        let expected_len = header.file_len(header_len);
        if file_size != expected_len {
            return Err(IndexError::corruption(format!(
                "Index file is {} bytes, header describes {}",
                file_size, expected_len
            )));
        }

        let comparator = TupleComparator::new(&header.key_schema, &header.sort_specs)
            .map_err(|e| IndexError::corruption(format!("Sort specs do not resolve: {}", e)))?;

        let mut top_bytes = vec![0u8; header.top_len as usize];
        read_section(&mut reader, &mut top_bytes, "top level")?;
        verify_section_checksum(&mut reader, &top_bytes, header_len, "Top level")?;
        let top = decode_top_level(&top_bytes, &header, &comparator, header_len)?;

        let bottom_start = header_len + header.top_len + CHECKSUM_LEN;
        verify_bottom_checksum(&mut reader, header.bottom_len, bottom_start)?;

        log_event_with_fields(
            Event::IndexOpened,
            &[
                ("path", &path.display().to_string()),
                ("entries", &header.entry_count.to_string()),
                ("top_entries", &header.top_count.to_string()),
                ("load_factor", &header.load_factor.to_string()),
            ],
        );

        Ok(Self {
            path: path.to_path_buf(),
            header,
            comparator,
            top,
            bottom_start,
            file: Mutex::new(reader.into_inner()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> u64 {
        self.header.entry_count
    }

    pub fn load_factor(&self) -> u32 {
        self.header.load_factor
    }

    pub fn top_count(&self) -> u64 {
        self.header.top_count
    }

    pub fn key_schema(&self) -> &Schema {
        &self.header.key_schema
    }

    pub fn sort_specs(&self) -> &[SortSpec] {
        &self.header.sort_specs
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Offset of the first entry whose key equals `key`
    pub fn find(&self, key: &Tuple) -> IndexResult<Option<u64>> {
        Ok(self
            .find_from(key, IndexPosition(0))?
            .map(|hit| hit.offset))
    }

    /// First entry at or after `from` whose key equals `key`.
    ///
    /// Passing `hit.position.next()` from a previous call walks the
    /// duplicates of a key one at a time.
    pub fn find_from(&self, key: &Tuple, from: IndexPosition) -> IndexResult<Option<IndexHit>> {
        self.check_key(key)?;
        let start = match self.seek(key, false)? {
            Some(ordinal) => ordinal.max(from.0),
            None => return Ok(None),
        };
        if start >= self.entry_count() {
            return Ok(None);
        }

        let entry = self.entry_at(start)?;
        if self.comparator.compare(&entry.key, key) == Ordering::Equal {
            Ok(Some(IndexHit {
                position: IndexPosition(start),
                offset: entry.offset,
            }))
        } else {
            Ok(None)
        }
    }

    /// All offsets whose key equals `key`, in index order
    pub fn scan_eq(&self, key: &Tuple) -> IndexResult<IndexScan<'_>> {
        self.scan_bounds(Bound::Included(key), Bound::Included(key))
    }

    /// All offsets with `low <= key <= high`, in key order
    pub fn find_range(&self, low: &Tuple, high: &Tuple) -> IndexResult<IndexScan<'_>> {
        self.scan_bounds(Bound::Included(low), Bound::Included(high))
    }

    /// Offsets of every entry within the bounds, in key order.
    ///
    /// An inverted range yields nothing.
    pub fn scan_bounds(
        &self,
        lower: Bound<&Tuple>,
        upper: Bound<&Tuple>,
    ) -> IndexResult<IndexScan<'_>> {
        for bound in [&lower, &upper] {
            if let Bound::Included(k) | Bound::Excluded(k) = bound {
                self.check_key(k)?;
            }
        }

        let start = match lower {
            Bound::Unbounded => Some(0),
            Bound::Included(k) => self.seek(k, false)?,
            Bound::Excluded(k) => self.seek(k, true)?,
        };

        let inverted = match (&lower, &upper) {
            (Bound::Included(l), Bound::Included(h)) => self.comparator.compare(l, h).is_gt(),
            (Bound::Included(l), Bound::Excluded(h))
            | (Bound::Excluded(l), Bound::Included(h))
            | (Bound::Excluded(l), Bound::Excluded(h)) => self.comparator.compare(l, h).is_ge(),
            _ => false,
        };

        let next = match start {
            Some(ordinal) if !inverted => ordinal,
            _ => self.entry_count(),
        };

        Ok(IndexScan {
            reader: self,
            next,
            upper: upper.cloned(),
            block: None,
            done: false,
        })
    }

    fn check_key(&self, key: &Tuple) -> IndexResult<()> {
        if key.len() != self.header.key_schema.len() {
            return Err(IndexError::invalid_key(format!(
                "Lookup key has {} values, index key schema {} has {}",
                key.len(),
                self.header.key_schema,
                self.header.key_schema.len()
            )));
        }
        Ok(())
    }

    /// Ordinal of the first entry whose key is not before `key`.
    ///
    /// With `strict` the first entry strictly after `key`. Returns `None`
    /// when every entry comes before.
    fn seek(&self, key: &Tuple, strict: bool) -> IndexResult<Option<u64>> {
        let before = |candidate: &Tuple| {
            let ord = self.comparator.compare(candidate, key);
            if strict {
                ord.is_le()
            } else {
                ord.is_lt()
            }
        };

        // blocks [0, n) start before `key`; the target is inside block n-1
        // or is the first entry of block n
        let n = self.top.partition_point(|t| before(&t.key));
        if n == 0 {
            return Ok(if self.top.is_empty() { None } else { Some(0) });
        }

        let block = (n - 1) as u64;
        let entries = self.read_block(block)?;
        let slot = entries.partition_point(|e| before(&e.key));
        let lf = u64::from(self.header.load_factor);

        if slot < entries.len() {
            Ok(Some(block * lf + slot as u64))
        } else if n < self.top.len() {
            Ok(Some(n as u64 * lf))
        } else {
            Ok(None)
        }
    }

    fn entry_at(&self, ordinal: u64) -> IndexResult<IndexEntry> {
        let lf = u64::from(self.header.load_factor);
        let entries = self.read_block(ordinal / lf)?;
        entries
            .into_iter()
            .nth((ordinal % lf) as usize)
            .ok_or_else(|| IndexError::corruption(format!("Entry {} missing", ordinal)))
    }

    fn read_block(&self, block: u64) -> IndexResult<Vec<IndexEntry>> {
        let index = block as usize;
        let start = self
            .top
            .get(index)
            .map(|t| t.block_offset)
            .ok_or_else(|| IndexError::corruption(format!("Block {} not in directory", block)))?;
        let end = self
            .top
            .get(index + 1)
            .map_or(self.header.bottom_len, |t| t.block_offset);

        let mut bytes = vec![0u8; (end - start) as usize];
        {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            file.seek(SeekFrom::Start(self.bottom_start + start))
                .map_err(|e| IndexError::io_error(format!("Failed to seek to block {}", block), e))?;
            file.read_exact(&mut bytes)
                .map_err(|e| IndexError::io_error(format!("Failed to read block {}", block), e))?;
        }

        let lf = u64::from(self.header.load_factor);
        let expected = lf.min(self.header.entry_count - block * lf) as usize;
        let absolute = self.bottom_start + start;

        let mut src = ByteReader::new(&bytes);
        let mut entries = Vec::with_capacity(expected);
        for _ in 0..expected {
            let key = src
                .read_tuple()
                .map_err(|e| IndexError::from_decode("bottom", absolute, e))?;
            let offset = src
                .read_u64()
                .map_err(|e| IndexError::from_decode("bottom", absolute, e))?;
            if key.len() != self.header.key_schema.len() {
                return Err(IndexError::corruption_at_offset(
                    absolute,
                    "Bottom entry key does not match key schema",
                ));
            }
            entries.push(IndexEntry { key, offset });
        }
        if src.remaining() != 0 {
            return Err(IndexError::corruption_at_offset(
                absolute,
                format!("Block {} has {} trailing bytes", block, src.remaining()),
            ));
        }
        Ok(entries)
    }
}

/// Lazy iterator over data offsets in key order
pub struct IndexScan<'a> {
    reader: &'a TwoLevelIndexReader,
    next: u64,
    upper: Bound<Tuple>,
    block: Option<(u64, Vec<IndexEntry>)>,
    done: bool,
}

impl<'a> IndexScan<'a> {
    /// Position of the entry the next call to `next` will examine
    pub fn position(&self) -> IndexPosition {
        IndexPosition(self.next)
    }

    /// Drains the scan into a vector of offsets
    pub fn collect_offsets(self) -> IndexResult<Vec<u64>> {
        self.collect()
    }

    fn within_upper(&self, key: &Tuple) -> bool {
        match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(h) => !self.reader.comparator.compare(key, h).is_gt(),
            Bound::Excluded(h) => self.reader.comparator.compare(key, h).is_lt(),
        }
    }
}

impl<'a> Iterator for IndexScan<'a> {
    type Item = IndexResult<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next >= self.reader.entry_count() {
            return None;
        }

        let lf = u64::from(self.reader.header.load_factor);
        let block = self.next / lf;
        let slot = (self.next % lf) as usize;

        let cached = matches!(self.block, Some((b, _)) if b == block);
        if !cached {
            match self.reader.read_block(block) {
                Ok(entries) => self.block = Some((block, entries)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let entry = match self.block.as_ref().and_then(|(_, entries)| entries.get(slot)) {
            Some(entry) => entry.clone(),
            None => {
                self.done = true;
                return Some(Err(IndexError::corruption(format!(
                    "Entry {} missing",
                    self.next
                ))));
            }
        };

        if !self.within_upper(&entry.key) {
            self.done = true;
            return None;
        }

        self.next += 1;
        Some(Ok(entry.offset))
    }
}

fn read_section<R: Read>(reader: &mut R, buf: &mut [u8], section: &str) -> IndexResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            IndexError::corruption(format!("Index {} truncated", section))
        } else {
            IndexError::io_error(format!("Failed to read index {}", section), e)
        }
    })
}

fn read_checksum<R: Read>(reader: &mut R, section: &str) -> IndexResult<u32> {
    let mut buf = [0u8; 4];
    read_section(reader, &mut buf, section)?;
    Ok(u32::from_le_bytes(buf))
}

fn verify_section_checksum<R: Read>(
    reader: &mut R,
    bytes: &[u8],
    section_start: u64,
    section: &str,
) -> IndexResult<()> {
    let stored = read_checksum(reader, section)?;
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    if hasher.finalize() != stored {
        return Err(IndexError::corruption_at_offset(
            section_start,
            format!("{} checksum mismatch", section),
        ));
    }
    Ok(())
}

fn verify_bottom_checksum<R: Read>(reader: &mut R, len: u64, start: u64) -> IndexResult<()> {
    let mut hasher = Hasher::new();
    let mut remaining = len;
    let mut chunk = vec![0u8; VERIFY_CHUNK];
    while remaining > 0 {
        let n = remaining.min(VERIFY_CHUNK as u64) as usize;
        read_section(reader, &mut chunk[..n], "bottom level")?;
        hasher.update(&chunk[..n]);
        remaining -= n as u64;
    }
    let stored = read_checksum(reader, "bottom level")?;
    if hasher.finalize() != stored {
        return Err(IndexError::corruption_at_offset(
            start,
            "Bottom level checksum mismatch",
        ));
    }
    Ok(())
}

fn decode_top_level(
    bytes: &[u8],
    header: &IndexHeader,
    comparator: &TupleComparator,
    section_start: u64,
) -> IndexResult<Vec<TopEntry>> {
    let mut src = ByteReader::new(bytes);
    let mut top: Vec<TopEntry> = Vec::with_capacity(header.top_count as usize);

    for i in 0..header.top_count {
        let at = section_start + src.position() as u64;
        let key = src.read_tuple().map_err(|e| IndexError::from_decode("top", at, e))?;
        let block_offset = src.read_u64().map_err(|e| IndexError::from_decode("top", at, e))?;

        if key.len() != header.key_schema.len() {
            return Err(IndexError::corruption_at_offset(
                at,
                "Top entry key does not match key schema",
            ));
        }
        if block_offset >= header.bottom_len {
            return Err(IndexError::corruption_at_offset(
                at,
                format!(
                    "Top entry {} points at {} outside bottom level of {} bytes",
                    i, block_offset, header.bottom_len
                ),
            ));
        }
        match top.last() {
            None if block_offset != 0 => {
                return Err(IndexError::corruption_at_offset(
                    at,
                    "First bottom block does not start at 0",
                ));
            }
            Some(prev) if block_offset <= prev.block_offset => {
                return Err(IndexError::corruption_at_offset(
                    at,
                    format!("Top entry {} offset {} is not increasing", i, block_offset),
                ));
            }
            Some(prev) if comparator.compare(&prev.key, &key).is_gt() => {
                return Err(IndexError::corruption_at_offset(
                    at,
                    format!("Top entry {} key is out of order", i),
                ));
            }
            _ => {}
        }

        top.push(TopEntry { key, block_offset });
    }

    if src.remaining() != 0 {
        return Err(IndexError::corruption_at_offset(
            section_start,
            format!("Top level has {} trailing bytes", src.remaining()),
        ));
    }
    Ok(top)
}
