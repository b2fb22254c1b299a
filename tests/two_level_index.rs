//! Two-Level Index Tests
//!
//! Bulk-loads a sorted index and checks it against a brute-force scan of the
//! same entries:
//! - Equality lookups return every duplicate, in write order
//! - Range lookups honor inclusive and exclusive bounds
//! - A reopened index answers identically
//! - Damaged files are reported as corruption

use std::fs;
use std::ops::Bound;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use tessera::index::{IndexErrorCode, TwoLevelIndexReader, TwoLevelIndexWriter};
use tessera::tuple::{DataType, Datum, Schema, SortSpec, Tuple, TupleComparator};

const ROWS: usize = 10_000;
const KEY_SPACE: i32 = 250;
const LOAD_FACTOR: u32 = 100;

// =============================================================================
// Helper Functions
// =============================================================================

fn key_schema() -> Schema {
    Schema::empty().with_column("k", DataType::Int4)
}

fn key(k: i32) -> Tuple {
    Tuple::new(vec![Datum::Int4(k)])
}

/// Random keys with synthetic data offsets, sorted by key (stable).
fn sorted_entries(seed: u64) -> Vec<(i32, u64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut entries: Vec<(i32, u64)> = (0..ROWS)
        .map(|i| (rng.gen_range(0..KEY_SPACE), i as u64 * 24))
        .collect();
    entries.sort_by_key(|(k, _)| *k);
    entries
}

fn build_index(path: &Path, entries: &[(i32, u64)]) {
    let mut writer = TwoLevelIndexWriter::create(
        path,
        key_schema(),
        vec![SortSpec::asc("k")],
        LOAD_FACTOR,
    )
    .unwrap()
    .with_order_verification(true);
    for (k, offset) in entries {
        writer.write(&key(*k), *offset).unwrap();
    }
    let summary = writer.close().unwrap();
    assert_eq!(summary.entry_count, ROWS as u64);
    assert_eq!(summary.top_count, (ROWS as u64) / u64::from(LOAD_FACTOR));
}

fn expected(entries: &[(i32, u64)], keep: impl Fn(i32) -> bool) -> Vec<u64> {
    entries
        .iter()
        .filter(|(k, _)| keep(*k))
        .map(|(_, offset)| *offset)
        .collect()
}

// =============================================================================
// Lookup Tests
// =============================================================================

/// Every key in the key space (and two outside it) matches a brute-force scan.
#[test]
fn test_equality_lookups_match_scan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.idx");
    let entries = sorted_entries(7);
    build_index(&path, &entries);

    let reader = TwoLevelIndexReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), ROWS as u64);
    assert_eq!(reader.load_factor(), LOAD_FACTOR);

    for k in -1..=KEY_SPACE {
        let offsets = reader.scan_eq(&key(k)).unwrap().collect_offsets().unwrap();
        assert_eq!(offsets, expected(&entries, |x| x == k), "key {}", k);
        assert_eq!(reader.find(&key(k)).unwrap(), offsets.first().copied());
    }
}

/// Random ranges, including inverted and open-ended ones.
#[test]
fn test_range_lookups_match_scan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.idx");
    let entries = sorted_entries(11);
    build_index(&path, &entries);
    let reader = TwoLevelIndexReader::open(&path).unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let low = rng.gen_range(-10..KEY_SPACE + 10);
        let high = rng.gen_range(-10..KEY_SPACE + 10);

        let inclusive = reader
            .find_range(&key(low), &key(high))
            .unwrap()
            .collect_offsets()
            .unwrap();
        assert_eq!(inclusive, expected(&entries, |k| low <= k && k <= high));

        let half_open = reader
            .scan_bounds(Bound::Excluded(&key(low)), Bound::Excluded(&key(high)))
            .unwrap()
            .collect_offsets()
            .unwrap();
        assert_eq!(half_open, expected(&entries, |k| low < k && k < high));
    }

    let below = reader
        .scan_bounds(Bound::Unbounded, Bound::Excluded(&key(10)))
        .unwrap()
        .collect_offsets()
        .unwrap();
    assert_eq!(below, expected(&entries, |k| k < 10));

    let all = reader
        .scan_bounds(Bound::Unbounded, Bound::Unbounded)
        .unwrap()
        .collect_offsets()
        .unwrap();
    assert_eq!(all.len(), ROWS);
}

/// A second reader over the same file sees the same entries.
#[test]
fn test_reopen_is_stable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.idx");
    let entries = sorted_entries(3);
    build_index(&path, &entries);

    let first = TwoLevelIndexReader::open(&path).unwrap();
    let second = TwoLevelIndexReader::open(&path).unwrap();
    assert_eq!(first.header(), second.header());
    for k in [0, 1, KEY_SPACE / 2, KEY_SPACE - 1] {
        assert_eq!(
            first.scan_eq(&key(k)).unwrap().collect_offsets().unwrap(),
            second.scan_eq(&key(k)).unwrap().collect_offsets().unwrap()
        );
    }
}

// =============================================================================
// Writer Contract Tests
// =============================================================================

/// With verification on, a key smaller than its predecessor is refused.
#[test]
fn test_order_violation_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.idx");
    let mut writer = TwoLevelIndexWriter::create(&path, key_schema(), vec![SortSpec::asc("k")], 4)
        .unwrap()
        .with_order_verification(true);

    writer.write(&key(5), 0).unwrap();
    let err = writer.write(&key(4), 24).unwrap_err();
    assert_eq!(err.code(), IndexErrorCode::TesseraIndexOrderViolation);
}

/// Descending indexes take keys largest first and scan in that order.
#[test]
fn test_descending_index() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("desc.idx");

    let comparator = TupleComparator::new(&key_schema(), &[SortSpec::desc("k")]).unwrap();
    let mut keys: Vec<Tuple> = (0..50).map(key).collect();
    comparator.sort(&mut keys);

    let mut writer = TwoLevelIndexWriter::create(&path, key_schema(), vec![SortSpec::desc("k")], 8)
        .unwrap()
        .with_order_verification(true);
    for (i, k) in keys.iter().enumerate() {
        writer.write(k, i as u64).unwrap();
    }
    writer.close().unwrap();

    let reader = TwoLevelIndexReader::open(&path).unwrap();
    // in index order the "lower" bound is the larger key
    let offsets = reader
        .find_range(&key(40), &key(30))
        .unwrap()
        .collect_offsets()
        .unwrap();
    assert_eq!(offsets, (9..=19).collect::<Vec<u64>>());
}

/// Flipped bytes are reported, never silently read.
#[test]
fn test_corruption_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k.idx");
    build_index(&path, &sorted_entries(5));

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let failed = match TwoLevelIndexReader::open(&path) {
        Err(err) => err.code() == IndexErrorCode::TesseraIndexCorruption,
        Ok(reader) => reader
            .scan_bounds(Bound::Unbounded, Bound::Unbounded)
            .unwrap()
            .any(|r| r.map_err(|e| e.code()) == Err(IndexErrorCode::TesseraIndexCorruption)),
    };
    assert!(failed);

    fs::write(&path, b"not an index").unwrap();
    assert_eq!(
        TwoLevelIndexReader::open(&path).unwrap_err().code(),
        IndexErrorCode::TesseraIndexCorruption
    );
}
