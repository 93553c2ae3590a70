//! FASTA parsing and chunked ingest
//!
//! A minimal multi-FASTA reader plus the pieces the `fasta` subcommand
//! uses to turn sequence files into a database: a renderer with the
//! conventional 60-column wrapping, a checksum for content-addressed
//! dedup keys, and a chunker that groups N records per document.

use std::collections::HashSet;
use std::io::BufRead;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::error::{FfError, Result};

/// Column width used when rendering sequence lines.
pub const LINE_WIDTH: usize = 60;

// =============================================================================
// FastaRecord
// =============================================================================

/// One FASTA record: `>id desc` header plus sequence bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl FastaRecord {
    pub fn new(id: impl Into<String>, desc: Option<String>, seq: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            desc,
            seq,
        }
    }

    /// Content checksum of the sequence, usable as a dedup key or id.
    ///
    /// Base64 of the SHA digest with the `=` padding stripped, in the
    /// style of seguid checksums.
    pub fn checksum(&self) -> String {
        let digest = Sha256::digest(&self.seq);
        let encoded = STANDARD.encode(digest);
        encoded.trim_end_matches('=').to_string()
    }

    /// Render as FASTA text: header line, then sequence wrapped at
    /// [`LINE_WIDTH`] columns, trailing newline included.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.seq.len() + self.seq.len() / LINE_WIDTH + 64);

        out.push(b'>');
        out.extend_from_slice(self.id.as_bytes());
        if let Some(desc) = &self.desc {
            out.push(b' ');
            out.extend_from_slice(desc.as_bytes());
        }
        out.push(b'\n');

        for chunk in self.seq.chunks(LINE_WIDTH) {
            out.extend_from_slice(chunk);
            out.push(b'\n');
        }

        out
    }
}

/// Split a `>id desc` header line into id and optional description.
fn split_header(line: &str) -> Result<(String, Option<String>)> {
    let Some(rest) = line.strip_prefix('>') else {
        return Err(FfError::Format(format!(
            "malformed fasta header, offending line is {:?}",
            line
        )));
    };

    match rest.split_once(' ') {
        Some((id, desc)) => Ok((id.to_string(), Some(desc.to_string()))),
        None => Ok((rest.to_string(), None)),
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Streaming multi-FASTA parser over a line source.
///
/// Yields records one at a time; a content line before the first header is
/// a fatal format error, and parsing stops at the first error.
pub struct FastaParser<R: BufRead> {
    reader: R,
    /// Header of the next record, read past while scanning the current one
    pending_header: Option<String>,
    done: bool,
}

impl<R: BufRead> FastaParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending_header: None,
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end().to_string()))
    }

    /// Find the next record's header line.
    fn next_header(&mut self) -> Result<Option<String>> {
        if let Some(header) = self.pending_header.take() {
            return Ok(Some(header));
        }

        loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) if line.starts_with('>') => return Ok(Some(line)),
                Some(line) => {
                    return Err(FfError::Format(format!(
                        "expected fasta header, found {:?}",
                        line
                    )))
                }
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        let Some(header) = self.next_header()? else {
            return Ok(None);
        };
        let (id, desc) = split_header(&header)?;

        let mut seq = Vec::new();
        loop {
            match self.read_line()? {
                None => break,
                Some(line) if line.starts_with('>') => {
                    self.pending_header = Some(line);
                    break;
                }
                Some(line) => seq.extend_from_slice(line.trim().as_bytes()),
            }
        }

        Ok(Some(FastaRecord::new(id, desc, seq)))
    }
}

impl<R: BufRead> Iterator for FastaParser<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// =============================================================================
// Dedup
// =============================================================================

/// Claim a checksum identity for `record` against caller-owned seen-state.
///
/// Returns false when the checksum was already claimed (the record is a
/// duplicate and should be skipped). Otherwise the record's id becomes the
/// checksum, its description is cleared, and the checksum is recorded in
/// `seen`.
pub fn claim_checksum_id(
    record: &mut FastaRecord,
    checksum: String,
    seen: &mut HashSet<String>,
) -> bool {
    if seen.contains(&checksum) {
        return false;
    }
    record.id = checksum.clone();
    record.desc = None;
    seen.insert(checksum);
    true
}

// =============================================================================
// Chunker
// =============================================================================

/// Groups rendered records into documents of `size` records each.
///
/// Each finished document is named after the first record it holds. The
/// document bytes are unterminated — callers frame them with the sentinel
/// when appending to a database.
pub struct DocumentChunker {
    size: usize,
    buf: BytesMut,
    name: Option<String>,
    count: usize,
}

impl DocumentChunker {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            buf: BytesMut::new(),
            name: None,
            count: 0,
        }
    }

    /// Add a record; returns a finished `(name, document)` when the chunk
    /// reaches its size.
    pub fn push(&mut self, record: &FastaRecord) -> Option<(String, Bytes)> {
        self.buf.extend_from_slice(&record.render());
        if self.name.is_none() {
            self.name = Some(record.id.clone());
        }
        self.count += 1;

        if self.count < self.size {
            return None;
        }
        self.take_chunk()
    }

    /// Flush whatever is buffered as a final, possibly short document.
    pub fn finish(&mut self) -> Option<(String, Bytes)> {
        self.take_chunk()
    }

    fn take_chunk(&mut self) -> Option<(String, Bytes)> {
        let name = self.name.take()?;
        self.count = 0;
        Some((name, self.buf.split().freeze()))
    }
}
