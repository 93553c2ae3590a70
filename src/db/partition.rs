//! Reordering and Partitioning
//!
//! Full rematerialization of a database in a chosen record order, and the
//! two ways of splitting one database into several:
//!
//! - **Balanced partition**: rows are pre-sorted by descending size (or an
//!   explicit order) and dealt round-robin across chunks, so each chunk's
//!   total byte volume comes out approximately equal. Every record is
//!   copied individually.
//! - **Quick partition**: the existing ascending-start order is sliced
//!   into contiguous runs and each run's underlying byte range is streamed
//!   straight between files. No balancing, O(1) per-record overhead —
//!   meant for inputs already roughly uniform in size.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::error::{FfError, Result};
use crate::index::{Index, IndexRow};
use crate::store::DataStore;

use super::Database;

// =============================================================================
// Output Naming
// =============================================================================

/// Filename template for partition output pairs.
///
/// `{name}` is the database basename, `{index}` the 1-based chunk number,
/// and `{ext}` becomes `ffindex` or `ffdata`. Parent directories in the
/// rendered path are created as needed.
#[derive(Debug, Clone)]
pub struct PartitionTemplate {
    pattern: String,
}

impl PartitionTemplate {
    /// The conventional `<name>_<index>.<ext>` layout.
    pub const DEFAULT_PATTERN: &'static str = "{name}_{index}.{ext}";

    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Render the output path for one chunk file.
    pub fn render(&self, name: &str, index: usize, ext: &str) -> PathBuf {
        PathBuf::from(
            self.pattern
                .replace("{name}", name)
                .replace("{index}", &index.to_string())
                .replace("{ext}", ext),
        )
    }

    /// Create (truncating) the output file for one chunk.
    fn create(&self, name: &str, index: usize, ext: &str) -> Result<File> {
        let path = self.render(name, index, ext);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(file)
    }
}

impl Default for PartitionTemplate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATTERN)
    }
}

// =============================================================================
// Tail Policy
// =============================================================================

/// What quick partition does with a final chunk holding a single record.
///
/// Historically such a tail was silently dropped rather than flushed as
/// its own partition. The default here writes every non-empty tail;
/// [`TailPolicy::DropSingle`] reproduces the historical behavior for
/// byte-compatible re-runs of old pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailPolicy {
    /// Write every non-empty trailing chunk
    #[default]
    Flush,
    /// Drop a trailing chunk that contains exactly one record
    DropSingle,
}

// =============================================================================
// Database Operations
// =============================================================================

impl Database {
    /// Rematerialize `source` into a fresh database in the given order.
    ///
    /// The default order is descending by size — biggest documents first.
    /// An explicit order must name every record of `source` exactly once;
    /// a count mismatch is an order error.
    pub fn reorder_from(
        source: &mut Database,
        store: DataStore,
        order: Option<Vec<IndexRow>>,
    ) -> Result<Database> {
        let rows = resolve_order(source, order)?;

        let mut out = Database::new(store);
        out.extend_copy(source, Some(&rows))?;
        Ok(out)
    }

    /// Split into `ceil(len / n)` balanced chunks of at most `n` records.
    ///
    /// Rows are sorted by descending size (or taken from `order`), then
    /// chunk `i` receives positions `i, i + nchunks, i + 2 * nchunks, ...`
    /// of that ordering. The stride spreads large and small records evenly,
    /// which is the whole load-balancing mechanism. Each chunk is copied
    /// record-by-record into its own `ffdata`/`ffindex` pair.
    ///
    /// Returns the number of chunks written.
    pub fn partition(
        &mut self,
        name: &str,
        template: &PartitionTemplate,
        n: usize,
        order: Option<Vec<IndexRow>>,
    ) -> Result<usize> {
        if n == 0 {
            return Err(FfError::Usage(
                "partition size must be at least 1".to_string(),
            ));
        }

        let ordered = resolve_order(self, order)?;
        if ordered.is_empty() {
            return Ok(0);
        }

        let nchunks = (ordered.len() + n - 1) / n;
        for chunk_pos in 0..nchunks {
            let chunk: Vec<IndexRow> = ordered[chunk_pos..]
                .iter()
                .step_by(nchunks)
                .cloned()
                .collect();

            let data_file = template.create(name, chunk_pos + 1, "ffdata")?;
            let index_file = template.create(name, chunk_pos + 1, "ffindex")?;

            let mut chunk_db = Database::new(DataStore::from_file(data_file));
            let written = chunk_db.extend_copy(self, Some(&chunk))?;

            let mut index_writer = BufWriter::new(index_file);
            chunk_db.index.write_to(&mut index_writer)?;
            index_writer.flush()?;

            tracing::debug!(
                "wrote balanced chunk {}/{}: {} records, {} bytes",
                chunk_pos + 1,
                nchunks,
                chunk.len(),
                written
            );
        }

        Ok(nchunks)
    }

    /// Split into contiguous runs of `n` records, streaming each run's
    /// byte range directly with no per-record copying or resorting.
    ///
    /// Chunk indexes are the original rows rebased to offset 0. See
    /// [`TailPolicy`] for the trailing-chunk behavior. Returns the number
    /// of chunks written.
    pub fn quick_partition(
        &mut self,
        name: &str,
        template: &PartitionTemplate,
        n: usize,
        tail: TailPolicy,
    ) -> Result<usize> {
        if n == 0 {
            return Err(FfError::Usage(
                "partition size must be at least 1".to_string(),
            ));
        }

        let rows = self.index.rows().to_vec();

        let mut written = 0;
        let mut run_start: u64 = 0;
        let mut run: Vec<IndexRow> = Vec::new();

        for (pos, row) in rows.iter().enumerate() {
            if pos > 0 && pos % n == 0 {
                written += 1;
                self.write_quick_chunk(run_start, row.start, name, template, &run, written)?;
                run.clear();
                run_start = row.start;
            }
            run.push(row.clone());
        }

        let flush_tail = match tail {
            TailPolicy::Flush => !run.is_empty(),
            TailPolicy::DropSingle => run.len() > 1,
        };
        if flush_tail {
            let end = run.last().map_or(run_start, IndexRow::end);
            written += 1;
            self.write_quick_chunk(run_start, end, name, template, &run, written)?;
        } else if !run.is_empty() {
            tracing::warn!(
                "dropping trailing chunk with {} record(s) (tail policy)",
                run.len()
            );
        }

        Ok(written)
    }

    /// Write one contiguous chunk: rebased index plus raw byte range.
    fn write_quick_chunk(
        &mut self,
        start: u64,
        end: u64,
        name: &str,
        template: &PartitionTemplate,
        rows: &[IndexRow],
        chunk_no: usize,
    ) -> Result<()> {
        let index_file = template.create(name, chunk_no, "ffindex")?;
        let data_file = template.create(name, chunk_no, "ffdata")?;

        let chunk_index = Index::from_rows(rows.to_vec())?.shifted(-(start as i64));

        let mut index_writer = BufWriter::new(index_file);
        chunk_index.write_to(&mut index_writer)?;
        index_writer.flush()?;

        let mut data_writer = BufWriter::new(data_file);
        self.data.copy_range(start, end - start, &mut data_writer)?;
        data_writer.flush()?;

        tracing::debug!(
            "wrote contiguous chunk {}: {} records, bytes {}..{}",
            chunk_no,
            rows.len(),
            start,
            end
        );

        Ok(())
    }
}

/// Default descending-size order, or a validated explicit one.
fn resolve_order(source: &Database, order: Option<Vec<IndexRow>>) -> Result<Vec<IndexRow>> {
    match order {
        Some(rows) => {
            if rows.len() != source.len() {
                return Err(FfError::OrderMismatch(format!(
                    "order names {} records but the index has {}",
                    rows.len(),
                    source.len()
                )));
            }
            Ok(rows)
        }
        None => {
            let mut rows = source.index().rows().to_vec();
            rows.sort_by(|a, b| b.size.cmp(&a.size));
            Ok(rows)
        }
    }
}
