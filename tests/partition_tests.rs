//! Tests for reordering and partitioning
//!
//! These tests verify:
//! - Default descending-size reorder and explicit permutations
//! - Order validation against the full index
//! - Balanced partition coverage and chunk counts
//! - Quick partition streaming, rebasing, and tail policies
//! - Output template rendering and directory creation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ffdb::{Database, DataStore, FfError, IndexRow, PartitionTemplate, TailPolicy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Build an in-memory database from (name, document) pairs.
fn db_with(records: &[(&str, &[u8])]) -> Database {
    let mut db = Database::in_memory();
    for (name, body) in records {
        db.append_raw(name.as_bytes().to_vec(), body).unwrap();
    }
    db
}

fn names(db: &Database) -> Vec<String> {
    db.index()
        .rows()
        .iter()
        .map(|r| String::from_utf8_lossy(&r.name).into_owned())
        .collect()
}

fn template_in(dir: &TempDir) -> PartitionTemplate {
    PartitionTemplate::new(format!(
        "{}/{{name}}_{{index}}.{{ext}}",
        dir.path().display()
    ))
}

fn open_chunk(dir: &TempDir, name: &str, index: usize) -> Database {
    let data = dir.path().join(format!("{}_{}.ffdata", name, index));
    let idx = dir.path().join(format!("{}_{}.ffindex", name, index));
    Database::open(
        DataStore::from_file(File::open(data).unwrap()),
        BufReader::new(File::open(idx).unwrap()),
    )
    .unwrap()
}

fn chunk_exists(dir: &TempDir, name: &str, index: usize) -> bool {
    dir.path()
        .join(format!("{}_{}.ffindex", name, index))
        .exists()
}

// =============================================================================
// reorder_from
// =============================================================================

#[test]
fn test_reorder_default_is_descending_size() {
    let mut db = db_with(&[("small", b"x"), ("large", b"xxxxxxxxxx"), ("mid", b"xxxx")]);

    let out = Database::reorder_from(&mut db, DataStore::in_memory(), None).unwrap();

    assert_eq!(names(&out), ["large", "mid", "small"]);
}

#[test]
fn test_reorder_explicit_order_is_a_permutation() {
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello"), ("c", b"x")]);

    let order: Vec<IndexRow> = ["c", "a", "b"]
        .iter()
        .map(|n| db.index().lookup_by_name(n.as_bytes()).unwrap().clone())
        .collect();

    let mut out = Database::reorder_from(&mut db, DataStore::in_memory(), Some(order)).unwrap();

    assert_eq!(names(&out), ["c", "a", "b"]);
    // Same records, same bytes, new offsets.
    assert_eq!(out.read(b"a").unwrap(), b"abc\0");
    assert_eq!(out.index().lookup_by_name(b"c").unwrap().start, 0);
}

#[test]
fn test_reorder_partial_order_is_rejected() {
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello")]);

    let order = vec![db.index().lookup_by_name(b"a").unwrap().clone()];
    let err = Database::reorder_from(&mut db, DataStore::in_memory(), Some(order)).unwrap_err();
    assert!(matches!(err, FfError::OrderMismatch(_)));
}

// =============================================================================
// Balanced Partition
// =============================================================================

#[test]
fn test_partition_covers_every_record_once() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[
        ("a", b"xxxxxxxxxxxx"),
        ("b", b"xxxxxxxx"),
        ("c", b"xxxxx"),
        ("d", b"xxx"),
        ("e", b"x"),
    ]);

    // ceil(5 / 2) = 3 chunks.
    let chunks = db.partition("db", &template_in(&dir), 2, None).unwrap();
    assert_eq!(chunks, 3);

    let mut seen = Vec::new();
    for i in 1..=chunks {
        let chunk = open_chunk(&dir, "db", i);
        seen.extend(names(&chunk));
    }
    seen.sort();
    assert_eq!(seen, ["a", "b", "c", "d", "e"]);
}

#[test]
fn test_partition_strides_sizes_across_chunks() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[
        ("a", b"xxxxxxxxxxxx"),
        ("b", b"xxxxxxxx"),
        ("c", b"xxxxx"),
        ("d", b"xxx"),
        ("e", b"x"),
    ]);

    db.partition("db", &template_in(&dir), 2, None).unwrap();

    // Descending sizes [a, b, c, d, e] dealt with stride 3:
    // chunk 1 gets positions {0, 3} = [a, d].
    let chunk = open_chunk(&dir, "db", 1);
    assert_eq!(names(&chunk), ["a", "d"]);
}

#[test]
fn test_partition_chunks_read_back_identical_bytes() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello"), ("c", b"x")]);

    let chunks = db.partition("db", &template_in(&dir), 1, None).unwrap();
    assert_eq!(chunks, 3);

    for i in 1..=chunks {
        let mut chunk = open_chunk(&dir, "db", i);
        let row = chunk.index().rows()[0].clone();
        let original = db.read(&row.name).unwrap();
        assert_eq!(chunk.read(&row.name).unwrap(), original);
    }
}

#[test]
fn test_partition_zero_size_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[("a", b"abc")]);
    assert!(matches!(
        db.partition("db", &template_in(&dir), 0, None).unwrap_err(),
        FfError::Usage(_)
    ));
}

// =============================================================================
// Quick Partition
// =============================================================================

#[test]
fn test_quick_partition_slices_contiguous_runs() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello"), ("c", b"x"), ("d", b"yz")]);

    let chunks = db
        .quick_partition("db", &template_in(&dir), 2, TailPolicy::Flush)
        .unwrap();
    assert_eq!(chunks, 2);

    // Runs keep the original ascending-start order.
    let chunk1 = open_chunk(&dir, "db", 1);
    assert_eq!(names(&chunk1), ["a", "b"]);
    let chunk2 = open_chunk(&dir, "db", 2);
    assert_eq!(names(&chunk2), ["c", "d"]);
}

#[test]
fn test_quick_partition_rebases_chunk_offsets() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello"), ("c", b"x"), ("d", b"yz")]);

    db.quick_partition("db", &template_in(&dir), 2, TailPolicy::Flush)
        .unwrap();

    let mut chunk2 = open_chunk(&dir, "db", 2);
    let row = chunk2.index().lookup_by_name(b"c").unwrap();
    assert_eq!(row.start, 0);
    assert_eq!(chunk2.read(b"c").unwrap(), b"x\0");
    assert_eq!(chunk2.read(b"d").unwrap(), b"yz\0");
}

#[test]
fn test_quick_partition_flushes_single_record_tail_by_default() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello"), ("c", b"x")]);

    let chunks = db
        .quick_partition("db", &template_in(&dir), 2, TailPolicy::Flush)
        .unwrap();
    assert_eq!(chunks, 2);

    let chunk2 = open_chunk(&dir, "db", 2);
    assert_eq!(names(&chunk2), ["c"]);
}

#[test]
fn test_quick_partition_can_drop_single_record_tail() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[("a", b"abc"), ("b", b"hello"), ("c", b"x")]);

    let chunks = db
        .quick_partition("db", &template_in(&dir), 2, TailPolicy::DropSingle)
        .unwrap();
    assert_eq!(chunks, 1);
    assert!(!chunk_exists(&dir, "db", 2));
}

#[test]
fn test_quick_partition_multi_record_tail_survives_drop_policy() {
    let dir = TempDir::new().unwrap();
    let mut db = db_with(&[
        ("a", b"abc"),
        ("b", b"hello"),
        ("c", b"x"),
        ("d", b"yz"),
        ("e", b"qrs"),
    ]);

    let chunks = db
        .quick_partition("db", &template_in(&dir), 3, TailPolicy::DropSingle)
        .unwrap();
    assert_eq!(chunks, 2);

    let chunk2 = open_chunk(&dir, "db", 2);
    assert_eq!(names(&chunk2), ["d", "e"]);
}

// =============================================================================
// Output Templates
// =============================================================================

#[test]
fn test_template_renders_placeholders() {
    let template = PartitionTemplate::new("out/{name}_{index}.{ext}");
    assert_eq!(
        template.render("db", 3, "ffindex"),
        Path::new("out/db_3.ffindex")
    );
}

#[test]
fn test_partition_creates_template_directories() {
    let dir = TempDir::new().unwrap();
    let template = PartitionTemplate::new(format!(
        "{}/nested/chunks/{{name}}_{{index}}.{{ext}}",
        dir.path().display()
    ));

    let mut db = db_with(&[("a", b"abc"), ("b", b"hello")]);
    db.partition("db", &template, 2, None).unwrap();

    assert!(dir.path().join("nested/chunks/db_1.ffindex").exists());
    assert!(dir.path().join("nested/chunks/db_1.ffdata").exists());
}
