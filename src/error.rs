//! Error types for ffdb
//!
//! Provides a unified error type for all operations, plus the exit-code
//! mapping used by the command-line tool.

use thiserror::Error;

/// Result type alias using FfError
pub type Result<T> = std::result::Result<T, FfError>;

/// Unified error type for ffdb operations
///
/// Everything except `Io` is a logic/data error: it is detected the moment
/// the violated precondition is evaluated and is unrecoverable at that
/// point. `Io` covers systemic faults (disk full, permissions, interrupted
/// syscalls) and is never retried by the core.
#[derive(Debug, Error)]
pub enum FfError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("malformed index line: {0}")]
    Format(String),

    #[error("duplicate record name: {0}")]
    DuplicateName(String),

    #[error("record not found: {0}")]
    KeyNotFound(String),

    #[error("order mismatch: {0}")]
    OrderMismatch(String),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    #[error("data block does not end with the 0x00 sentinel byte")]
    SentinelContract,

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("usage error: {0}")]
    Usage(String),
}

// =============================================================================
// Process Exit Codes
// =============================================================================

/// Successful run.
pub const EXIT_OK: i32 = 0;

/// Invalid command-line usage (sysexits EX_USAGE).
pub const EXIT_USAGE: i32 = 64;

/// Malformed or inconsistent input data (sysexits EX_DATAERR).
pub const EXIT_DATAERR: i32 = 65;

/// Operating-system level I/O failure (sysexits EX_IOERR).
pub const EXIT_IOERR: i32 = 74;

/// Terminated by interrupt (128 + SIGINT).
pub const EXIT_INTERRUPT: i32 = 130;

impl FfError {
    /// Map this error to a process exit code.
    ///
    /// Automated callers branch on four categories: success, usage error,
    /// data error, and I/O error.
    pub fn exit_code(&self) -> i32 {
        match self {
            FfError::Io(_) => EXIT_IOERR,
            FfError::Usage(_) => EXIT_USAGE,
            FfError::Format(_)
            | FfError::DuplicateName(_)
            | FfError::KeyNotFound(_)
            | FfError::OrderMismatch(_)
            | FfError::SentinelContract => EXIT_DATAERR,
        }
    }
}

/// Render a record name for error messages.
///
/// Names are byte strings on disk; errors show them lossily as UTF-8.
pub(crate) fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
