//! Crate-level error and warning types.
//!
//! [`ArchiveError`] aborts a pack or unpack.  [`Warning`] is recorded for a
//! single entry and the pass carries on.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::crypto::{CipherMode, CryptoError};
use crate::frame::FrameError;
use crate::header::HeaderError;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Cannot create archive {path}: {source}")]
    CreateOutput { path: PathBuf, source: io::Error },

    #[error("Cannot open archive {path}: {source}")]
    OpenInput { path: PathBuf, source: io::Error },

    #[error("Unknown archive format (magic {})", String::from_utf8_lossy(.magic))]
    UnknownFormat { magic: [u8; 8] },

    #[error("Unknown compression flag {0:#04x}")]
    UnknownCompression(u8),

    #[error("Archive is encrypted with {0} but no password was given")]
    PasswordRequired(CipherMode),

    #[error("Archive truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("Corrupt frame: {0}")]
    CorruptFrame(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<HeaderError> for ArchiveError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::UnknownFormat(magic) => ArchiveError::UnknownFormat { magic },
            HeaderError::Compression(crate::codec::CodecError::UnknownFlag(f)) => {
                ArchiveError::UnknownCompression(f)
            }
            HeaderError::Compression(other) => ArchiveError::CorruptFrame(other.to_string()),
            HeaderError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ArchiveError::Truncated { field: "header" }
            }
            HeaderError::Io(e) => ArchiveError::Io(e),
        }
    }
}

impl From<FrameError> for ArchiveError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Truncated { field } => ArchiveError::Truncated { field },
            FrameError::Io(e)               => ArchiveError::Io(e),
            other                           => ArchiveError::CorruptFrame(other.to_string()),
        }
    }
}

// ── Warnings ─────────────────────────────────────────────────────────────────

/// Per-entry problem that did not stop the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Source could not be read while packing; the frame was written empty.
    SourceUnreadable { path: String, reason: String },
    /// Stored CRC32 does not match the payload.
    Integrity { path: String, expected: u32, actual: u32 },
    /// Absolute or parent-escaping path; the entry was not restored.
    UnsafePath { path: String },
    /// The entry could not be created on disk.
    Materialize { path: String, reason: String },
    /// Path exceeds the frame limit; the entry was not written.
    PathTooLong { path: String, len: u64 },
}

impl Warning {
    pub fn path(&self) -> &str {
        match self {
            Warning::SourceUnreadable { path, .. }
            | Warning::Integrity { path, .. }
            | Warning::UnsafePath { path }
            | Warning::Materialize { path, .. }
            | Warning::PathTooLong { path, .. } => path,
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Warning::Integrity { .. })
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SourceUnreadable { path, reason } => {
                write!(f, "{path}: unreadable, stored empty ({reason})")
            }
            Warning::Integrity { path, expected, actual } => {
                write!(f, "{path}: CRC mismatch (stored {expected:08X}, computed {actual:08X})")
            }
            Warning::UnsafePath { path } => write!(f, "{path}: unsafe path, skipped"),
            Warning::Materialize { path, reason } => write!(f, "{path}: cannot restore ({reason})"),
            Warning::PathTooLong { path, len } => {
                let head: String = path.chars().take(48).collect();
                write!(f, "{head}...: path of {len} bytes is too long, skipped")
            }
        }
    }
}
