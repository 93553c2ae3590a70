//! Database Module
//!
//! Composes an [`Index`] and a [`DataStore`] into one database and carries
//! the composite operations the command-line tools drive: record copies
//! between databases, concatenation, filtering, merging, iteration, and the
//! partitioning algorithms.
//!
//! ## Central Invariant
//!
//! Every index row's `[start, start + size)` range references bytes
//! actually present in the paired data store. All mutating operations go
//! through [`Index::append`]'s contiguous-growth rule, so the invariant
//! holds after every one of them.

mod documents;
mod partition;

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};

use bytes::Bytes;

use crate::error::{FfError, Result};
use crate::index::{Index, IndexRow};
use crate::store::{DataStore, SENTINEL};

pub use documents::Documents;
pub use partition::{PartitionTemplate, TailPolicy};

// =============================================================================
// Database
// =============================================================================

/// One index + one data store, kept in 1:1 correspondence.
#[derive(Debug)]
pub struct Database {
    index: Index,
    data: DataStore,
}

impl Database {
    /// New empty database writing into `data`.
    pub fn new(data: DataStore) -> Self {
        Self {
            index: Index::new(),
            data,
        }
    }

    /// New empty database over an in-memory buffer.
    pub fn in_memory() -> Self {
        Self::new(DataStore::in_memory())
    }

    /// Open an existing database: the index is parsed eagerly, the data
    /// source is only wrapped — record bytes are read on demand.
    pub fn open<R: BufRead>(data: DataStore, index_reader: R) -> Result<Self> {
        let index = Index::from_reader(index_reader)?;
        Ok(Self { index, data })
    }

    /// The record index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// The underlying data store.
    pub fn data_mut(&mut self) -> &mut DataStore {
        &mut self.data
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the database holds no records.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True when a record with this name exists.
    pub fn contains(&self, name: &[u8]) -> bool {
        self.index.contains(name)
    }

    /// Read one record's bytes by name, sentinel included.
    pub fn read(&mut self, name: &[u8]) -> Result<Vec<u8>> {
        let row = self.index.lookup_by_name(name)?.clone();
        self.data.read(&row)
    }

    // -------------------------------------------------------------------------
    // Record Copies
    // -------------------------------------------------------------------------

    /// Copy one record from `source` to the end of this database.
    ///
    /// The bytes move unchanged; the record's offset is reassigned by the
    /// contiguous-growth rule. Returns bytes written.
    pub fn append_copy(&mut self, source: &mut Database, row: &IndexRow) -> Result<u64> {
        let bytes = source.data.read(row)?;
        self.index.append(row.name.clone(), row.size)?;
        self.data.append(&bytes)
    }

    /// [`Database::append_copy`] with the row resolved by name in `source`.
    pub fn append_copy_by_name(&mut self, source: &mut Database, name: &[u8]) -> Result<u64> {
        let row = source.index.lookup_by_name(name)?.clone();
        self.append_copy(source, &row)
    }

    /// Copy several records from `source`, in the given order.
    ///
    /// `None` copies every record of `source` in ascending-start order.
    /// Returns total bytes written.
    pub fn extend_copy(&mut self, source: &mut Database, rows: Option<&[IndexRow]>) -> Result<u64> {
        let rows: Vec<IndexRow> = match rows {
            Some(rows) => rows.to_vec(),
            None => source.index.rows().to_vec(),
        };

        let mut written = 0;
        for row in &rows {
            written += self.append_copy(source, row)?;
        }
        Ok(written)
    }

    /// Append newly generated content under `name`.
    ///
    /// A missing trailing sentinel is added here — this is the one entry
    /// point that terminates records itself, because the caller hands over
    /// raw document bytes rather than an already-framed record.
    pub fn append_raw(&mut self, name: impl Into<Bytes>, bytes: &[u8]) -> Result<u64> {
        if bytes.last() == Some(&SENTINEL) {
            self.index.append(name, bytes.len() as u64)?;
            self.data.append(bytes)
        } else {
            let mut framed = Vec::with_capacity(bytes.len() + 1);
            framed.extend_from_slice(bytes);
            framed.push(SENTINEL);
            self.index.append(name, framed.len() as u64)?;
            self.data.append(&framed)
        }
    }

    // -------------------------------------------------------------------------
    // Concatenation
    // -------------------------------------------------------------------------

    /// Append every other database to this one.
    ///
    /// Each input's data bytes are streamed whole onto the end of this
    /// store, and its rows are re-appended with recomputed offsets. Input
    /// order and within-input record order are both preserved.
    pub fn concat(&mut self, others: &mut [Database]) -> Result<()> {
        for other in others.iter_mut() {
            self.index.extend(other.index.rows())?;
            self.data.append_from(&mut other.data)?;
            tracing::debug!("concatenated {} records", other.len());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Iterate `(name, bytes)` over every document in ascending-start
    /// order, one record in memory at a time.
    ///
    /// Each document has exactly one trailing sentinel stripped. With
    /// `trim`, the first `trim` newline-delimited lines are dropped and
    /// documents with no lines left are skipped. The sequence is
    /// forward-only and single-pass; build a new one to iterate again.
    pub fn documents(&mut self, trim: Option<usize>) -> Documents<'_> {
        Documents::new(&self.index, &mut self.data, trim)
    }

    /// Write every document to `sink`, newline-separated.
    ///
    /// A newline is appended after any document that does not already end
    /// with one, so the output has one document per line-run regardless of
    /// each record's trailing-newline convention.
    pub fn collect_into<W: Write>(&mut self, sink: &mut W, trim: Option<usize>) -> Result<()> {
        let mut documents = self.documents(trim);
        while let Some(item) = documents.next() {
            let (_, document) = item?;
            sink.write_all(&document)?;
            if !document.ends_with(b"\n") {
                sink.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Filtering & Merging
    // -------------------------------------------------------------------------

    /// Filter records by name into a fresh database backed by `store`.
    ///
    /// A non-empty `include` acts as an allow-list, otherwise all rows
    /// pass; `exclude` then removes by name. Survivors are re-sorted by
    /// ascending start before copying so the data reads stay sequential.
    /// Both sets empty is a usage error.
    pub fn select(
        &mut self,
        include: &HashSet<Bytes>,
        exclude: &HashSet<Bytes>,
        store: DataStore,
    ) -> Result<Database> {
        if include.is_empty() && exclude.is_empty() {
            return Err(FfError::Usage(
                "select requires at least one of an include or exclude set".to_string(),
            ));
        }

        let mut survivors: Vec<IndexRow> = self
            .index
            .rows()
            .iter()
            .filter(|row| include.is_empty() || include.contains(&row.name))
            .filter(|row| !exclude.contains(&row.name))
            .cloned()
            .collect();
        survivors.sort_by_key(|row| row.start);

        let mut out = Database::new(store);
        out.extend_copy(self, Some(&survivors))?;
        Ok(out)
    }

    /// Merge records sharing a name across `inputs` into one database.
    ///
    /// For every distinct name, all matching documents are stripped of
    /// their trailing sentinel and newlines, joined with single newlines,
    /// re-terminated with `\n\0`, and appended under that name. Names are
    /// processed in first-seen order; within a group, records follow input
    /// database order, then within-database order.
    pub fn join_concat(inputs: &mut [Database], store: DataStore) -> Result<Database> {
        let mut names: Vec<Bytes> = Vec::new();
        let mut groups: HashMap<Bytes, Vec<(usize, IndexRow)>> = HashMap::new();

        for (db_pos, db) in inputs.iter().enumerate() {
            for row in db.index.rows() {
                groups
                    .entry(row.name.clone())
                    .or_insert_with(|| {
                        names.push(row.name.clone());
                        Vec::new()
                    })
                    .push((db_pos, row.clone()));
            }
        }

        let mut out = Database::new(store);
        for name in names {
            let mut merged = Vec::new();
            for (db_pos, row) in &groups[&name] {
                let document = inputs[*db_pos].data.read(row)?;
                let body = trim_terminators(&document);
                if !merged.is_empty() {
                    merged.push(b'\n');
                }
                merged.extend_from_slice(body);
            }
            merged.extend_from_slice(b"\n\0");
            out.append_raw(name, &merged)?;
        }

        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Serialize the index and stream the data file to a pair of sinks.
    ///
    /// Returns `(data_bytes, index_bytes)` written.
    pub fn write_to<D, I>(&mut self, data_sink: &mut D, index_sink: &mut I) -> Result<(u64, u64)>
    where
        D: Write,
        I: Write,
    {
        let index_bytes = self.index.write_to(index_sink)?;
        let data_bytes = self.data.copy_all(data_sink)?;
        Ok((data_bytes, index_bytes))
    }
}

/// Strip a document's trailing sentinel and newline bytes.
fn trim_terminators(document: &[u8]) -> &[u8] {
    let mut end = document.len();
    while end > 0 && matches!(document[end - 1], SENTINEL | b'\n') {
        end -= 1;
    }
    &document[..end]
}
