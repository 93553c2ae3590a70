//! Tests for the DataStore backings
//!
//! These tests verify:
//! - Seek/read addressing through IndexRow ranges
//! - The sentinel contract on appends
//! - Whole-file and partial-range streaming copies
//! - Identical read semantics across file, mmap, and memory backings

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use ffdb::{DataStore, FfError, IndexRow};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Write `bytes` to a fresh file in `dir` and reopen it for reading.
fn data_file(dir: &TempDir, bytes: &[u8]) -> (PathBuf, File) {
    let path = dir.path().join("test.ffdata");
    let mut file = File::create(&path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
    (path.clone(), File::open(&path).unwrap())
}

fn row(name: &str, start: u64, size: u64) -> IndexRow {
    IndexRow::new(name.as_bytes().to_vec(), start, size)
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_read_by_row_range() {
    let dir = TempDir::new().unwrap();
    let (_, file) = data_file(&dir, b"abc\0hello\0");

    let mut store = DataStore::from_file(file);
    assert_eq!(store.read(&row("a", 0, 4)).unwrap(), b"abc\0");
    assert_eq!(store.read(&row("b", 4, 6)).unwrap(), b"hello\0");
}

#[test]
fn test_read_many_preserves_input_order() {
    let dir = TempDir::new().unwrap();
    let (_, file) = data_file(&dir, b"abc\0hello\0");

    let mut store = DataStore::from_file(file);
    let records = store
        .read_many(&[row("b", 4, 6), row("a", 0, 4)])
        .unwrap();

    assert_eq!(records[0], b"hello\0");
    assert_eq!(records[1], b"abc\0");
}

#[test]
fn test_read_past_eof_is_io_error() {
    let mut store = DataStore::from_bytes(b"abc\0".to_vec());
    assert!(matches!(
        store.read(&row("a", 0, 10)).unwrap_err(),
        FfError::Io(_)
    ));
}

// =============================================================================
// Appends
// =============================================================================

#[test]
fn test_append_requires_sentinel() {
    let mut store = DataStore::in_memory();
    let err = store.append(b"no terminator").unwrap_err();
    assert!(matches!(err, FfError::SentinelContract));
}

#[test]
fn test_append_grows_at_end() {
    let mut store = DataStore::in_memory();
    assert_eq!(store.append(b"abc\0").unwrap(), 4);
    assert_eq!(store.append(b"hello\0").unwrap(), 6);
    assert_eq!(store.len().unwrap(), 10);
    assert_eq!(store.read(&row("b", 4, 6)).unwrap(), b"hello\0");
}

#[test]
fn test_append_to_file_backing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.ffdata");
    let file = File::options()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();

    let mut store = DataStore::from_file(file);
    store.append(b"abc\0").unwrap();
    store.append(b"hello\0").unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"abc\0hello\0");
}

// =============================================================================
// Streaming Copies
// =============================================================================

#[test]
fn test_copy_all_streams_from_offset_zero() {
    let dir = TempDir::new().unwrap();
    let (_, file) = data_file(&dir, b"abc\0hello\0");

    let mut store = DataStore::from_file(file);
    // A read first, so the cursor is mid-file before the copy.
    store.read(&row("b", 4, 6)).unwrap();

    let mut out = Vec::new();
    let copied = store.copy_all(&mut out).unwrap();
    assert_eq!(copied, 10);
    assert_eq!(out, b"abc\0hello\0");
}

#[test]
fn test_copy_range_streams_partial_bytes() {
    let dir = TempDir::new().unwrap();
    let (_, file) = data_file(&dir, b"abc\0hello\0");

    let mut store = DataStore::from_file(file);
    let mut out = Vec::new();
    store.copy_range(4, 6, &mut out).unwrap();
    assert_eq!(out, b"hello\0");
}

#[test]
fn test_copy_range_past_eof_is_io_error() {
    let mut store = DataStore::from_bytes(b"abc\0".to_vec());
    let mut out = Vec::new();
    assert!(matches!(
        store.copy_range(2, 10, &mut out).unwrap_err(),
        FfError::Io(_)
    ));
}

// =============================================================================
// Memory-Mapped Backing
// =============================================================================

#[test]
fn test_mmap_reads_match_file_reads() {
    let dir = TempDir::new().unwrap();
    let (path, file) = data_file(&dir, b"abc\0hello\0worlds\0");

    let rows = [row("a", 0, 4), row("b", 4, 6), row("c", 10, 7)];

    let mut plain = DataStore::from_file(file);
    let mut mapped = DataStore::map_file(&File::open(&path).unwrap()).unwrap();

    assert_eq!(
        plain.read_many(&rows).unwrap(),
        mapped.read_many(&rows).unwrap()
    );

    let mut from_plain = Vec::new();
    let mut from_mapped = Vec::new();
    plain.copy_range(4, 13, &mut from_plain).unwrap();
    mapped.copy_range(4, 13, &mut from_mapped).unwrap();
    assert_eq!(from_plain, from_mapped);
}

#[test]
fn test_mmap_backing_is_read_only() {
    let dir = TempDir::new().unwrap();
    let (path, _) = data_file(&dir, b"abc\0");

    let mut mapped = DataStore::map_file(&File::open(&path).unwrap()).unwrap();
    assert!(matches!(
        mapped.append(b"more\0").unwrap_err(),
        FfError::Usage(_)
    ));
}
