//! Index structure for ffindex databases
//!
//! Maps record names to byte ranges in the paired data file.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ <name> \t <start> \t <size> \n               │
//! │ ... one line per record ...                  │
//! └──────────────────────────────────────────────┘
//! ```
//! Integers are base-10. Lines are sorted by name, byte-wise ascending.
//! No header, no trailing metadata.
//!
//! The serialized order (by name) and the working order (by start) are
//! independent: the in-memory index is kept sorted by `start` so that
//! appends can always compute the next contiguous offset from the tail.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::ops::Range;

use bytes::Bytes;

use crate::error::{display_name, FfError, Result};

// =============================================================================
// IndexRow
// =============================================================================

/// One record's location in the paired data file.
///
/// `size` includes the trailing 0x00 sentinel byte; `start` is the byte
/// offset where the record begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// Record name, non-empty and unique within an index
    pub name: Bytes,
    /// Byte offset of the record in the data file
    pub start: u64,
    /// Record length in bytes, sentinel included
    pub size: u64,
}

impl IndexRow {
    /// Create a row from its parts.
    pub fn new(name: impl Into<Bytes>, start: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            start,
            size,
        }
    }

    /// Parse one `name\tstart\tsize` index line.
    ///
    /// Wrong field count or a non-numeric offset is a fatal format error.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let mut fields = line
            .split(|b: &u8| b.is_ascii_whitespace())
            .filter(|f| !f.is_empty());

        let name = fields
            .next()
            .ok_or_else(|| format_error(line, "expected 3 fields, found 0"))?;
        let start = fields
            .next()
            .ok_or_else(|| format_error(line, "expected 3 fields, found 1"))
            .and_then(|f| parse_u64(line, f))?;
        let size = fields
            .next()
            .ok_or_else(|| format_error(line, "expected 3 fields, found 2"))
            .and_then(|f| parse_u64(line, f))?;

        if fields.next().is_some() {
            return Err(format_error(line, "expected 3 fields, found more"));
        }

        Ok(Self::new(Bytes::copy_from_slice(name), start, size))
    }

    /// One past the last byte of this record's range.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Render this row as an index line, trailing newline included.
    fn render_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name);
        out.push(b'\t');
        out.extend_from_slice(self.start.to_string().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.size.to_string().as_bytes());
        out.push(b'\n');
    }
}

fn format_error(line: &[u8], detail: &str) -> FfError {
    FfError::Format(format!("{:?}: {}", String::from_utf8_lossy(line), detail))
}

fn parse_u64(line: &[u8], field: &[u8]) -> Result<u64> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| format_error(line, "non-numeric offset field"))
}

// =============================================================================
// Index
// =============================================================================

/// Ordered collection of [`IndexRow`] with a name lookup.
///
/// Rows are held sorted by `start` ascending. Names are unique; inserting a
/// duplicate is a fatal invariant error, and the failed insert leaves the
/// index unmodified.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Rows in ascending-start order
    rows: Vec<IndexRow>,
    /// Name → position in `rows`
    by_name: HashMap<Bytes, usize>,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from pre-existing rows.
    ///
    /// Rows are re-sorted by `start`; duplicate names are rejected.
    pub fn from_rows(mut rows: Vec<IndexRow>) -> Result<Self> {
        rows.sort_by_key(|r| r.start);

        let mut by_name = HashMap::with_capacity(rows.len());
        for (pos, row) in rows.iter().enumerate() {
            if row.name.is_empty() {
                return Err(FfError::Format("empty record name".to_string()));
            }
            if by_name.insert(row.name.clone(), pos).is_some() {
                return Err(FfError::DuplicateName(display_name(&row.name)));
            }
        }

        Ok(Self { rows, by_name })
    }

    /// Parse an index from a `.ffindex` reader.
    ///
    /// Blank lines are skipped; any malformed line aborts the parse.
    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut rows = Vec::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            while line.last().is_some_and(|b| b.is_ascii_whitespace()) {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            rows.push(IndexRow::parse(&line)?);
        }

        Self::from_rows(rows)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when a record with this name exists.
    pub fn contains(&self, name: &[u8]) -> bool {
        self.by_name.contains_key(name)
    }

    /// All rows in ascending-start order.
    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }

    /// Iterate rows in ascending-start order.
    pub fn iter(&self) -> std::slice::Iter<'_, IndexRow> {
        self.rows.iter()
    }

    /// One past the end of the last record's range (0 when empty).
    ///
    /// For an index built purely via [`Index::append`] this equals the
    /// paired data file's logical length.
    pub fn data_len(&self) -> u64 {
        self.rows.last().map_or(0, IndexRow::end)
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Exact lookup by record name; absence is a fatal key error.
    pub fn lookup_by_name(&self, name: &[u8]) -> Result<&IndexRow> {
        self.by_name
            .get(name)
            .map(|&pos| &self.rows[pos])
            .ok_or_else(|| FfError::KeyNotFound(display_name(name)))
    }

    /// Positional lookup over the ascending-start order.
    pub fn lookup_by_position(&self, position: usize) -> Option<&IndexRow> {
        self.rows.get(position)
    }

    /// Positional range over the ascending-start order, clamped to bounds.
    pub fn lookup_range(&self, range: Range<usize>) -> &[IndexRow] {
        let start = range.start.min(self.rows.len());
        let end = range.end.min(self.rows.len()).max(start);
        &self.rows[start..end]
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Append a record of `size` bytes, assigning its offset.
    ///
    /// The start is 0 for the first record, otherwise
    /// `last.start + last.size` — appends always grow contiguously.
    pub fn append(&mut self, name: impl Into<Bytes>, size: u64) -> Result<&IndexRow> {
        let name = name.into();
        if name.is_empty() {
            return Err(FfError::Usage("record name must be non-empty".to_string()));
        }
        if self.by_name.contains_key(&name) {
            return Err(FfError::DuplicateName(display_name(&name)));
        }

        let start = self.rows.last().map_or(0, IndexRow::end);
        self.by_name.insert(name.clone(), self.rows.len());
        self.rows.push(IndexRow { name, start, size });

        Ok(self.rows.last().expect("row just pushed"))
    }

    /// Repeated [`Index::append`] over `rows`; returns the count appended.
    ///
    /// Only each row's name and size are used; starts are recomputed.
    pub fn extend<'a, I>(&mut self, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a IndexRow>,
    {
        let mut count = 0;
        for row in rows {
            self.append(row.name.clone(), row.size)?;
            count += 1;
        }
        Ok(count)
    }

    /// New index with every start adjusted by `by`, sizes unchanged.
    ///
    /// Used to rebase a contiguous slice of a data file so the first record
    /// of a partition starts at byte 0. Shifting a record before offset
    /// zero is a caller bug and panics.
    pub fn shifted(&self, by: i64) -> Self {
        if by == 0 {
            return self.clone();
        }

        let rows = self
            .rows
            .iter()
            .map(|r| IndexRow {
                name: r.name.clone(),
                start: r
                    .start
                    .checked_add_signed(by)
                    .expect("index shift moved a record before offset zero"),
                size: r.size,
            })
            .collect();

        // Relative order is unchanged, so positions stay valid.
        Self {
            rows,
            by_name: self.by_name.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Write the index in its on-disk form: rows sorted by name, one
    /// `name\tstart\tsize\n` line each. Returns bytes written.
    ///
    /// This is the byte-exact contract other ffindex tools read.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let mut sorted: Vec<&IndexRow> = self.rows.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut written = 0u64;
        let mut line = Vec::new();
        for row in sorted {
            line.clear();
            row.render_into(&mut line);
            writer.write_all(&line)?;
            written += line.len() as u64;
        }

        Ok(written)
    }

    /// Serialize to an owned buffer (see [`Index::write_to`]).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out)
            .expect("write to Vec cannot fail");
        out
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a IndexRow;
    type IntoIter = std::slice::Iter<'a, IndexRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
