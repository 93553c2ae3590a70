//! Document Iterator
//!
//! Forward-only, single-pass iteration over a database's documents in
//! ascending-start order. One record is resident at a time, so memory use
//! is bounded by the largest single document, not the database size.

use bytes::Bytes;

use crate::error::Result;
use crate::index::{Index, IndexRow};
use crate::store::{DataStore, SENTINEL};

/// Iterator over `(name, document)` pairs.
///
/// Yields documents with their trailing sentinel stripped. Exhausted once
/// driven to the end; restarting requires rebuilding from the index.
pub struct Documents<'a> {
    data: &'a mut DataStore,
    rows: std::slice::Iter<'a, IndexRow>,
    /// Leading newline-delimited lines to drop from each document
    trim: Option<usize>,
}

impl<'a> Documents<'a> {
    pub(super) fn new(index: &'a Index, data: &'a mut DataStore, trim: Option<usize>) -> Self {
        Self {
            data,
            rows: index.rows().iter(),
            trim,
        }
    }
}

impl Iterator for Documents<'_> {
    type Item = Result<(Bytes, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = self.rows.next()?;

            let mut document = match self.data.read(row) {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(e)),
            };

            // Exactly one trailing sentinel belongs to the record frame.
            if document.last() == Some(&SENTINEL) {
                document.pop();
            }

            match self.trim {
                None => return Some(Ok((row.name.clone(), document))),
                Some(n) => match trim_lines(&document, n) {
                    Some(trimmed) => return Some(Ok((row.name.clone(), trimmed))),
                    // Nothing left after trimming: skip this document.
                    None => continue,
                },
            }
        }
    }
}

/// Drop the first `n` newline-delimited lines of `document`.
///
/// Returns `None` when no lines remain. A document with a trailing newline
/// splits into a final empty piece, so trimming can legitimately leave an
/// empty (but present) document.
fn trim_lines(document: &[u8], n: usize) -> Option<Vec<u8>> {
    let lines: Vec<&[u8]> = document.split(|&b| b == b'\n').collect();
    if lines.len() <= n {
        return None;
    }
    Some(lines[n..].join(&b"\n"[..]))
}
