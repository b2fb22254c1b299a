//! Row reader with checksum verification
//!
//! Supports sequential scans of a data fragment and positioned reads at a
//! record offset (the access path used by index scans).

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};
use super::record::{RowRecord, MIN_RECORD_SIZE};
use crate::tuple::Tuple;

/// A unit of table data handed to a scan: one row file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Table (or intermediate block output) this fragment belongs to
    pub name: String,
    /// Row data file
    pub path: PathBuf,
}

impl Fragment {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Reader over a row data file
pub struct RowReader {
    path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
}

impl RowReader {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| {
            StorageError::io_error(format!("Failed to open data file: {}", path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| StorageError::io_error("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn has_more(&self) -> bool {
        self.current_offset < self.file_size
    }

    /// Reads the next row.
    ///
    /// - `Ok(Some(tuple))` if a row was read
    /// - `Ok(None)` at end of file
    /// - `Err(TESSERA_DATA_CORRUPTION)` on framing or checksum failure
    pub fn read_next(&mut self) -> StorageResult<Option<Tuple>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_RECORD_SIZE as u64 {
            return Err(StorageError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Truncated data file: {} bytes remaining, minimum record size is {}",
                    remaining, MIN_RECORD_SIZE
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            StorageError::io_error(
                format!("Failed to read record length at offset {}", self.current_offset),
                e,
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < MIN_RECORD_SIZE as u64 || record_length > remaining {
            return Err(StorageError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Invalid record length {} ({} bytes remaining)",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            StorageError::io_error(
                format!("Failed to read record body at offset {}", self.current_offset),
                e,
            )
        })?;

        let (record, consumed) = RowRecord::deserialize(&record_buf)
            .map_err(|e| StorageError::corruption_at_offset(self.current_offset, e.to_string()))?;

        self.current_offset += consumed as u64;
        Ok(Some(record.tuple))
    }

    /// Reads every remaining row
    pub fn read_all(&mut self) -> StorageResult<Vec<Tuple>> {
        let mut rows = Vec::new();
        while let Some(row) = self.read_next()? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn seek_to(&mut self, offset: u64) -> StorageResult<()> {
        self.reader.seek(SeekFrom::Start(offset)).map_err(|e| {
            StorageError::io_error(format!("Failed to seek to offset {}", offset), e)
        })?;
        self.current_offset = offset;
        Ok(())
    }

    /// Reads the row whose record starts at `offset`
    pub fn read_at(&mut self, offset: u64) -> StorageResult<Tuple> {
        self.seek_to(offset)?;
        match self.read_next()? {
            Some(row) => Ok(row),
            None => Err(StorageError::corruption_at_offset(
                offset,
                "No record at specified offset",
            )),
        }
    }

    pub fn reset(&mut self) -> StorageResult<()> {
        self.seek_to(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RowAppender, StorageErrorCode};
    use crate::tuple::Datum;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_rows(path: &Path, n: i32) -> Vec<u64> {
        let mut appender = RowAppender::create(path).unwrap();
        let offsets = (0..n)
            .map(|i| appender.append(&Tuple::new(vec![Datum::Int4(i)])).unwrap())
            .collect();
        appender.close().unwrap();
        offsets
    }

    #[test]
    fn test_sequential_scan_and_reset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t.rows");
        write_rows(&path, 5);

        let mut reader = RowReader::open(&path).unwrap();
        assert_eq!(reader.read_all().unwrap().len(), 5);
        assert!(reader.read_next().unwrap().is_none());

        reader.reset().unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap().get(0), Some(&Datum::Int4(0)));
    }

    #[test]
    fn test_truncated_tail_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t.rows");
        write_rows(&path, 2);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x01, 0x02, 0x03]).unwrap();
        drop(file);

        let mut reader = RowReader::open(&path).unwrap();
        reader.read_next().unwrap();
        reader.read_next().unwrap();
        let err = reader.read_next().unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::TesseraDataCorruption);
    }

    #[test]
    fn test_read_past_end_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t.rows");
        write_rows(&path, 1);

        let mut reader = RowReader::open(&path).unwrap();
        let err = reader.read_at(reader.file_size()).unwrap_err();
        assert!(err.is_fatal());
    }
}
