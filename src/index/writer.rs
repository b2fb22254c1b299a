//! Two-level index writer
//!
//! Bulk-builds an immutable index from keys supplied in non-decreasing
//! comparator order. Entries are buffered until `close`, which writes the
//! header, top level and bottom level in one pass and fsyncs the file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;

use super::errors::{IndexError, IndexResult};
use super::format::IndexHeader;
use crate::observability::{log_event_with_fields, Event};
use crate::tuple::{encode_tuple, Schema, SortSpec, Tuple, TupleComparator};

/// Outcome of a completed index build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub entry_count: u64,
    pub top_count: u64,
    pub load_factor: u32,
    pub file_size: u64,
}

/// Writer for one two-level index file.
///
/// Every `load_factor`-th entry starts a new bottom block and its key is
/// sampled into the top level. `close` consumes the writer, so nothing can
/// be written after the file is sealed.
pub struct TwoLevelIndexWriter {
    path: PathBuf,
    file: File,
    key_schema: Schema,
    sort_specs: Vec<SortSpec>,
    comparator: TupleComparator,
    load_factor: u32,
    verify_order: bool,
    top: Vec<u8>,
    bottom: Vec<u8>,
    entry_count: u64,
    last_key: Option<Tuple>,
}

impl TwoLevelIndexWriter {
    /// Creates (or truncates) the index file at `path`.
    ///
    /// Fails with `TESSERA_INDEX_INVALID_KEY` when the sort specs are empty
    /// or name a column missing from `key_schema`, or when `load_factor` is 0.
    pub fn create(
        path: &Path,
        key_schema: Schema,
        sort_specs: Vec<SortSpec>,
        load_factor: u32,
    ) -> IndexResult<Self> {
        if load_factor == 0 {
            return Err(IndexError::invalid_key("Load factor must be greater than 0"));
        }
        if sort_specs.is_empty() || key_schema.is_empty() {
            return Err(IndexError::invalid_key("An index needs at least one key column"));
        }
        let comparator = TupleComparator::new(&key_schema, &sort_specs)
            .map_err(|e| IndexError::invalid_key(e.to_string()))?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                IndexError::io_error(format!("Failed to create index file: {}", path.display()), e)
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            key_schema,
            sort_specs,
            comparator,
            load_factor,
            verify_order: false,
            top: Vec::new(),
            bottom: Vec::new(),
            entry_count: 0,
            last_key: None,
        })
    }

    /// Rejects out-of-order keys with `TESSERA_INDEX_ORDER_VIOLATION`
    /// instead of writing an index that lookups cannot search.
    pub fn with_order_verification(mut self, verify: bool) -> Self {
        self.verify_order = verify;
        self
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    /// Adds one (key, data offset) entry
    pub fn write(&mut self, key: &Tuple, offset: u64) -> IndexResult<()> {
        if key.len() != self.key_schema.len() {
            return Err(IndexError::invalid_key(format!(
                "Key has {} values, index key schema {} has {}",
                key.len(),
                self.key_schema,
                self.key_schema.len()
            )));
        }

        if self.verify_order {
            if let Some(ref last) = self.last_key {
                if self.comparator.compare(last, key).is_gt() {
                    return Err(IndexError::order_violation(
                        self.entry_count,
                        format!("key {} follows larger key {}", key, last),
                    ));
                }
            }
            self.last_key = Some(key.clone());
        }

        if self.entry_count % u64::from(self.load_factor) == 0 {
            encode_tuple(key, &mut self.top);
            self.top.extend_from_slice(&(self.bottom.len() as u64).to_le_bytes());
        }

        encode_tuple(key, &mut self.bottom);
        self.bottom.extend_from_slice(&offset.to_le_bytes());
        self.entry_count += 1;
        Ok(())
    }

    /// Writes all sections, fsyncs and returns a summary
    pub fn close(self) -> IndexResult<IndexSummary> {
        let header = IndexHeader {
            load_factor: self.load_factor,
            entry_count: self.entry_count,
            top_count: IndexHeader::expected_top_count(self.entry_count, self.load_factor),
            top_len: self.top.len() as u64,
            bottom_len: self.bottom.len() as u64,
            key_schema: self.key_schema,
            sort_specs: self.sort_specs,
        };
        let header_bytes = header.encode()?;

        let mut out = BufWriter::new(self.file);
        let write_err =
            |e| IndexError::io_error(format!("Failed to write index file: {}", self.path.display()), e);

        out.write_all(&header_bytes).map_err(write_err)?;
        for section in [&self.top, &self.bottom] {
            let mut hasher = Hasher::new();
            hasher.update(section);
            out.write_all(section).map_err(write_err)?;
            out.write_all(&hasher.finalize().to_le_bytes()).map_err(write_err)?;
        }
        out.flush().map_err(write_err)?;
        out.get_ref()
            .sync_all()
            .map_err(|e| IndexError::io_error("fsync failed on index file", e))?;

        let summary = IndexSummary {
            file_size: header.file_len(header_bytes.len() as u64),
            path: self.path,
            entry_count: header.entry_count,
            top_count: header.top_count,
            load_factor: header.load_factor,
        };

        log_event_with_fields(
            Event::IndexBuilt,
            &[
                ("path", &summary.path.display().to_string()),
                ("entries", &summary.entry_count.to_string()),
                ("top_entries", &summary.top_count.to_string()),
                ("load_factor", &summary.load_factor.to_string()),
                ("bytes", &summary.file_size.to_string()),
            ],
        );

        Ok(summary)
    }
}
