//! Data file access for ffdata blobs
//!
//! Random-access reads and end-of-file appends over a single byte source.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ record 0 bytes ............ 0x00             │
//! │ record 1 bytes ............ 0x00             │
//! │ ... concatenated records ...                 │
//! └──────────────────────────────────────────────┘
//! ```
//! Record `i` occupies bytes `[start, start + size)` of the file; the last
//! byte of every range is a single 0x00 sentinel. There are no other
//! structural markers — lengths live only in the paired index.
//!
//! The store itself is unordered; all addressing comes from [`IndexRow`]
//! ranges supplied by the index. Three backings share one read interface:
//! a plain file (seek + read), a memory-mapped view for callers that want
//! to avoid per-record syscalls on large inputs, and an in-memory buffer
//! for building small outputs. The mapped view is read-only and is
//! unmapped when the store is dropped.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use memmap2::Mmap;

use crate::error::{display_name, FfError, Result};
use crate::index::IndexRow;

/// Record terminator: a single 0x00 closes every record's byte range.
pub const SENTINEL: u8 = 0x00;

// =============================================================================
// Backing Sources
// =============================================================================

#[derive(Debug)]
enum Backing {
    /// Seek/read file handle
    File(File),
    /// Read-only memory-mapped view of a file
    Mmap(Mmap),
    /// Growable in-memory buffer
    Memory(Vec<u8>),
}

// =============================================================================
// DataStore
// =============================================================================

/// Random-access accessor over one ffdata byte source.
#[derive(Debug)]
pub struct DataStore {
    backing: Backing,
}

impl DataStore {
    /// Wrap an open file handle.
    pub fn from_file(file: File) -> Self {
        Self {
            backing: Backing::File(file),
        }
    }

    /// Map a file into memory and read from the mapping.
    ///
    /// Read semantics are identical to [`DataStore::from_file`]; only the
    /// syscall pattern changes. The resulting store is read-only and the
    /// mapping is released on drop, on every exit path.
    pub fn map_file(file: &File) -> Result<Self> {
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self {
            backing: Backing::Mmap(mmap),
        })
    }

    /// Empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Vec::new()),
        }
    }

    /// In-memory store seeded with existing bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Memory(bytes),
        }
    }

    /// Current length of the backing source in bytes.
    pub fn len(&self) -> Result<u64> {
        match &self.backing {
            Backing::File(f) => Ok(f.metadata()?.len()),
            Backing::Mmap(m) => Ok(m.len() as u64),
            Backing::Memory(v) => Ok(v.len() as u64),
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read one record's byte range, sentinel included.
    pub fn read(&mut self, row: &IndexRow) -> Result<Vec<u8>> {
        match &mut self.backing {
            Backing::File(f) => {
                f.seek(SeekFrom::Start(row.start))?;
                let mut buf = vec![0u8; row.size as usize];
                f.read_exact(&mut buf)?;
                Ok(buf)
            }
            Backing::Mmap(m) => slice_record(m, row).map(<[u8]>::to_vec),
            Backing::Memory(v) => slice_record(v, row).map(<[u8]>::to_vec),
        }
    }

    /// Read several records, preserving the input order.
    pub fn read_many(&mut self, rows: &[IndexRow]) -> Result<Vec<Vec<u8>>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.read(row)?);
        }
        Ok(records)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Append a record's bytes at end-of-file; returns bytes written.
    ///
    /// The input must already end with the sentinel byte — the store
    /// checks and refuses rather than silently fixing, because the format
    /// has no per-record length tag in the binary file to fall back on.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        if bytes.last() != Some(&SENTINEL) {
            return Err(FfError::SentinelContract);
        }

        match &mut self.backing {
            Backing::File(f) => {
                f.seek(SeekFrom::End(0))?;
                f.write_all(bytes)?;
                Ok(bytes.len() as u64)
            }
            Backing::Mmap(_) => Err(read_only_error()),
            Backing::Memory(v) => {
                v.extend_from_slice(bytes);
                Ok(bytes.len() as u64)
            }
        }
    }

    /// Append another store's entire contents at end-of-file.
    ///
    /// No sentinel check: the source is already record-structured, and its
    /// final byte is the last record's sentinel.
    pub fn append_from(&mut self, source: &mut DataStore) -> Result<u64> {
        match &mut self.backing {
            Backing::File(f) => {
                f.seek(SeekFrom::End(0))?;
                source.copy_all(f)
            }
            Backing::Mmap(_) => Err(read_only_error()),
            Backing::Memory(v) => source.copy_all(v),
        }
    }

    // -------------------------------------------------------------------------
    // Streaming copies
    // -------------------------------------------------------------------------

    /// Stream the entire backing source to `dest`, from offset 0.
    pub fn copy_all<W: Write>(&mut self, dest: &mut W) -> Result<u64> {
        match &mut self.backing {
            Backing::File(f) => {
                f.seek(SeekFrom::Start(0))?;
                Ok(io::copy(f, dest)?)
            }
            Backing::Mmap(m) => {
                dest.write_all(m)?;
                Ok(m.len() as u64)
            }
            Backing::Memory(v) => {
                dest.write_all(v)?;
                Ok(v.len() as u64)
            }
        }
    }

    /// Stream only the byte range `[start, start + size)` to `dest`.
    ///
    /// This is the primitive contiguous partitioning relies on to move
    /// whole runs of records between files without materializing them.
    pub fn copy_range<W: Write>(&mut self, start: u64, size: u64, dest: &mut W) -> Result<u64> {
        match &mut self.backing {
            Backing::File(f) => {
                f.seek(SeekFrom::Start(start))?;
                let copied = io::copy(&mut f.take(size), dest)?;
                if copied != size {
                    return Err(range_past_eof(start, size));
                }
                Ok(copied)
            }
            Backing::Mmap(m) => copy_slice_range(m, start, size, dest),
            Backing::Memory(v) => copy_slice_range(v, start, size, dest),
        }
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

fn slice_record<'a>(bytes: &'a [u8], row: &IndexRow) -> Result<&'a [u8]> {
    let start = usize::try_from(row.start).map_err(|_| range_past_eof(row.start, row.size))?;
    start
        .checked_add(row.size as usize)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| {
            FfError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record {} spans {}..{} past end of data file ({} bytes)",
                    display_name(&row.name),
                    row.start,
                    row.end(),
                    bytes.len()
                ),
            ))
        })
}

fn copy_slice_range<W: Write>(bytes: &[u8], start: u64, size: u64, dest: &mut W) -> Result<u64> {
    let begin = usize::try_from(start).map_err(|_| range_past_eof(start, size))?;
    let slice = begin
        .checked_add(size as usize)
        .and_then(|end| bytes.get(begin..end))
        .ok_or_else(|| range_past_eof(start, size))?;
    dest.write_all(slice)?;
    Ok(size)
}

fn range_past_eof(start: u64, size: u64) -> FfError {
    FfError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("range {}..{} extends past end of data file", start, start + size),
    ))
}

fn read_only_error() -> FfError {
    FfError::Usage("cannot append to a memory-mapped data store (read-only view)".to_string())
}
