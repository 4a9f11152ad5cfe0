//! Streaming archive engine: writer and reader.
//!
//! # Writer
//! [`ArchiveWriter`] writes the header, then one frame per record, in a
//! single forward pass.  Exactly one cipher instance exists per writer, so an
//! RC4 keystream runs unbroken from the first frame to the last.  Payloads are
//! compressed first, checksummed, then encrypted.
//!
//! # Reader
//! [`ArchiveReader`] validates the header (magic, compression flag, password
//! presence) before yielding anything, then decodes frames one at a time with
//! [`ArchiveReader::next_entry`].  A CRC mismatch is reported on the entry and
//! does not stop the stream; any framing error does.
//!
//! Neither side seeks, so both work over pipes and in-memory buffers.

use std::fs;
use std::io::{Read, Write};

use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{get_compressor, CompressionMode, Compressor};
use crate::crc;
use crate::crypto::{new_cipher, CipherMode, CipherStream};
use crate::error::{ArchiveError, Result, Warning};
use crate::frame::{Frame, FrameMeta, MAX_PATH_LEN};
use crate::header::ArchiveHeader;
use crate::record::{FileAttributes, FileRecord, FileType};

// ── PackSummary ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct PackSummary {
    pub cipher:      CipherMode,
    pub compression: CompressionMode,
    pub files:       u64,
    pub directories: u64,
    pub symlinks:    u64,
    /// Records not written: type `Other` or an over-long path.
    pub skipped:     u64,
    /// Payload bytes before compression.
    pub bytes_in:    u64,
    /// Archive size including the header.
    pub bytes_out:   u64,
    pub warnings:    Vec<Warning>,
}

impl PackSummary {
    pub fn frames(&self) -> u64 {
        self.files + self.directories + self.symlinks
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ArchiveWriter<W: Write> {
    writer:      W,
    header:      ArchiveHeader,
    cipher:      Box<dyn CipherStream>,
    compressor:  Box<dyn Compressor>,
    pub summary: PackSummary,
}

impl<W: Write> ArchiveWriter<W> {
    /// Write the header and set up the cipher.  An empty password always
    /// produces an unencrypted archive, whatever `cipher` asks for.
    pub fn new(
        mut writer:  W,
        cipher:      CipherMode,
        password:    &[u8],
        compression: CompressionMode,
    ) -> Result<Self> {
        let cipher = cipher.resolve(password);
        let header = ArchiveHeader { cipher, compression };
        header.write(&mut writer)?;

        let summary = PackSummary {
            cipher,
            compression,
            bytes_out: crate::header::HEADER_SIZE as u64,
            ..PackSummary::default()
        };

        Ok(Self {
            writer,
            header,
            cipher: new_cipher(cipher, password)?,
            compressor: get_compressor(compression),
            summary,
        })
    }

    pub fn header(&self) -> ArchiveHeader {
        self.header
    }

    /// Add one scanned record.
    ///
    /// A regular file that cannot be read is still written, with an empty
    /// payload, and recorded as a [`Warning::SourceUnreadable`].
    pub fn add_record(&mut self, record: &FileRecord) -> Result<()> {
        let data = match record.file_type {
            FileType::Other => {
                self.summary.skipped += 1;
                return Ok(());
            }
            FileType::Directory => Vec::new(),
            FileType::Symlink => record.link_target.clone().unwrap_or_default().into_bytes(),
            FileType::Regular => match fs::read(&record.source_path) {
                Ok(d)  => d,
                Err(e) => {
                    warn!(path = %record.rel_path, error = %e, "source unreadable, storing empty payload");
                    self.summary.warnings.push(Warning::SourceUnreadable {
                        path:   record.rel_path.clone(),
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            },
        };

        self.add_entry(record.file_type, &record.rel_path, &data, record.attrs)
    }

    /// Add an entry from memory.  `Other` entries are counted and dropped, as
    /// are paths the reader would refuse (longer than [`MAX_PATH_LEN`]), which
    /// also record a [`Warning::PathTooLong`].
    pub fn add_entry(
        &mut self,
        file_type: FileType,
        path:      &str,
        data:      &[u8],
        attrs:     FileAttributes,
    ) -> Result<()> {
        if path.len() as u64 > MAX_PATH_LEN {
            warn!(len = path.len(), limit = MAX_PATH_LEN, "path too long, entry skipped");
            self.summary.skipped += 1;
            self.summary.warnings.push(Warning::PathTooLong { path: path.to_owned(), len: path.len() as u64 });
            return Ok(());
        }

        match file_type {
            FileType::Regular   => self.summary.files += 1,
            FileType::Directory => self.summary.directories += 1,
            FileType::Symlink   => self.summary.symlinks += 1,
            FileType::Other     => {
                self.summary.skipped += 1;
                return Ok(());
            }
        }

        let payload = if data.is_empty() { Vec::new() } else { self.compressor.compress(data) };
        let frame   = Frame::new(file_type, path.to_owned(), payload, attrs);
        debug!(path, kind = file_type.name(), raw = data.len(), stored = frame.meta.payload_len, "frame");

        let written = frame.write(&mut self.writer, self.cipher.as_mut())?;
        self.summary.bytes_in  += data.len() as u64;
        self.summary.bytes_out += written;
        Ok(())
    }

    /// Flush and hand back the underlying writer with the pass summary.
    pub fn finish(mut self) -> Result<(W, PackSummary)> {
        self.writer.flush()?;
        Ok((self.writer, self.summary))
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// A decoded entry.  `data` is decompressed; the CRC was checked against the
/// stored (compressed) payload.
#[derive(Debug, Clone)]
pub struct Entry {
    pub meta:         FrameMeta,
    pub data:         Vec<u8>,
    pub computed_crc: u32,
}

impl Entry {
    pub fn crc_ok(&self) -> bool {
        self.computed_crc == self.meta.crc32
    }

    pub fn integrity_warning(&self) -> Option<Warning> {
        (!self.crc_ok()).then(|| Warning::Integrity {
            path:     self.meta.path.clone(),
            expected: self.meta.crc32,
            actual:   self.computed_crc,
        })
    }
}

pub struct ArchiveReader<R: Read> {
    reader:     R,
    header:     ArchiveHeader,
    cipher:     Box<dyn CipherStream>,
    compressor: Box<dyn Compressor>,
    done:       bool,
}

impl<R: Read> ArchiveReader<R> {
    /// Read and validate the header.
    ///
    /// Fails with [`ArchiveError::UnknownFormat`] on a foreign magic and with
    /// [`ArchiveError::PasswordRequired`] when the archive is encrypted and
    /// `password` is empty.
    pub fn open(mut reader: R, password: &[u8]) -> Result<Self> {
        let header = ArchiveHeader::read(&mut reader)?;
        if header.cipher != CipherMode::None && password.is_empty() {
            return Err(ArchiveError::PasswordRequired(header.cipher));
        }
        Ok(Self {
            reader,
            header,
            cipher:     new_cipher(header.cipher, password)?,
            compressor: get_compressor(header.compression),
            done:       false,
        })
    }

    pub fn header(&self) -> ArchiveHeader {
        self.header
    }

    /// Decode the next entry, `Ok(None)` at the clean end of the archive.
    /// After an error the reader is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.done {
            return Ok(None);
        }
        let frame = match Frame::read(&mut self.reader, self.cipher.as_mut()) {
            Ok(Some(f)) => f,
            Ok(None)    => {
                self.done = true;
                return Ok(None);
            }
            Err(e) => {
                self.done = true;
                return Err(e.into());
            }
        };

        let computed_crc = crc::calculate(&frame.payload);
        if computed_crc != frame.meta.crc32 {
            warn!(
                path = %frame.meta.path,
                expected = %format!("{:08X}", frame.meta.crc32),
                actual = %format!("{:08X}", computed_crc),
                "CRC mismatch"
            );
        }

        let data = if frame.payload.is_empty() {
            Vec::new()
        } else {
            self.compressor.decompress(&frame.payload)
        };

        Ok(Some(Entry { meta: frame.meta, data, computed_crc }))
    }
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
