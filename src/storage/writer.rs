//! Row appender
//!
//! Appends framed row records to a data file and reports the byte offset of
//! each record. Offsets are what the two-level index stores per entry.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::record::RowRecord;
use crate::tuple::Tuple;

/// Append-only writer for a row data file.
///
/// Records are buffered; `flush` pushes them to the OS and `close` fsyncs.
pub struct RowAppender {
    path: PathBuf,
    writer: BufWriter<File>,
    current_offset: u64,
    rows_written: u64,
}

impl RowAppender {
    /// Creates (or truncates) a data file, creating parent directories.
    pub fn create(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::io_error(
                        format!("Failed to create directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                StorageError::io_error(format!("Failed to create data file: {}", path.display()), e)
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            current_offset: 0,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset the next appended record will get
    pub fn offset(&self) -> u64 {
        self.current_offset
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Appends a row, returning the byte offset of its record
    pub fn append(&mut self, tuple: &Tuple) -> StorageResult<u64> {
        let bytes = RowRecord::new(tuple.clone()).serialize();
        let offset = self.current_offset;

        self.writer.write_all(&bytes).map_err(|e| {
            StorageError::io_error(format!("Failed to append row at offset {}", offset), e)
        })?;

        self.current_offset += bytes.len() as u64;
        self.rows_written += 1;
        Ok(offset)
    }

    pub fn flush(&mut self) -> StorageResult<()> {
        self.writer
            .flush()
            .map_err(|e| StorageError::io_error("Failed to flush data file", e))
    }

    /// Flushes and fsyncs, returning the final file size
    pub fn close(mut self) -> StorageResult<u64> {
        self.flush()?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| StorageError::io_error("fsync failed on data file", e))?;
        Ok(self.current_offset)
    }
}
