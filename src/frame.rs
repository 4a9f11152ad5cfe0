//! Per-entry frame: encrypted metadata fields followed by the payload.
//!
//! ```text
//! type        u8
//! path_len    u64 LE
//! path        path_len bytes, UTF-8, '/' separated
//! payload_len u64 LE          length after compression
//! crc32       u32 LE          over the compressed, unencrypted payload
//! meta block  20 bytes        mode u32 | uid u32 | gid u32 | mtime i64 (LE)
//! payload     payload_len bytes
//! ```
//!
//! Each of the seven fields goes through the cipher separately and in this
//! order, on both the write and the read side.  A stream that ends cleanly
//! before a type byte is the end of the archive; ending anywhere else is
//! corruption.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::crc;
use crate::crypto::CipherStream;
use crate::record::{FileAttributes, FileType};

/// Upper bound on a stored path.  Anything larger means the stream is out of
/// sync or the password is wrong.
pub const MAX_PATH_LEN: u64 = 64 * 1024;

pub const META_BLOCK_SIZE: usize = 20;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Archive truncated while reading {field}")]
    Truncated { field: &'static str },
    #[error("Unknown entry type code {0} (corrupt archive or wrong password)")]
    UnknownType(u8),
    #[error("Stored path length {0} exceeds limit (corrupt archive or wrong password)")]
    PathTooLong(u64),
    #[error("Stored path is not valid UTF-8 (corrupt archive or wrong password)")]
    InvalidPath,
    #[error("Payload length {0} does not fit in memory")]
    PayloadTooLarge(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    pub file_type:   FileType,
    pub path:        String,
    pub payload_len: u64,
    pub crc32:       u32,
    pub attrs:       FileAttributes,
}

/// One decoded frame.  `payload` is still compressed.
#[derive(Debug, Clone)]
pub struct Frame {
    pub meta:    FrameMeta,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame around an already-compressed payload.
    pub fn new(file_type: FileType, path: String, payload: Vec<u8>, attrs: FileAttributes) -> Self {
        let meta = FrameMeta {
            file_type,
            path,
            payload_len: payload.len() as u64,
            crc32:       crc::calculate(&payload),
            attrs,
        };
        Self { meta, payload }
    }

    pub fn crc_matches(&self) -> bool {
        crc::calculate(&self.payload) == self.meta.crc32
    }

    /// Encrypt and write.  Consumes the payload buffer, which is encrypted in
    /// place.
    pub fn write<W: Write>(self, mut writer: W, cipher: &mut dyn CipherStream) -> io::Result<u64> {
        let meta = &self.meta;
        // `Other` never reaches the writer.
        let code = meta.file_type.code().unwrap_or(0);

        let mut written = 0u64;
        let mut put = |buf: &mut [u8], writer: &mut W| -> io::Result<()> {
            cipher.apply(buf);
            writer.write_all(buf)?;
            written += buf.len() as u64;
            Ok(())
        };

        put(&mut [code], &mut writer)?;

        let mut len_buf = [0u8; 8];
        LittleEndian::write_u64(&mut len_buf, meta.path.len() as u64);
        put(&mut len_buf, &mut writer)?;

        let mut path = meta.path.as_bytes().to_vec();
        put(&mut path, &mut writer)?;

        LittleEndian::write_u64(&mut len_buf, meta.payload_len);
        put(&mut len_buf, &mut writer)?;

        let mut crc_buf = [0u8; 4];
        LittleEndian::write_u32(&mut crc_buf, meta.crc32);
        put(&mut crc_buf, &mut writer)?;

        let mut block = encode_meta_block(&meta.attrs);
        put(&mut block, &mut writer)?;

        let mut payload = self.payload;
        if !payload.is_empty() {
            put(&mut payload, &mut writer)?;
        }
        Ok(written)
    }

    /// Read and decrypt the next frame.  `Ok(None)` on a clean end of stream.
    pub fn read<R: Read>(mut reader: R, cipher: &mut dyn CipherStream) -> Result<Option<Self>, FrameError> {
        let mut type_buf = [0u8; 1];
        if !read_first_byte(&mut reader, &mut type_buf)? {
            return Ok(None);
        }
        cipher.apply(&mut type_buf);
        let file_type = FileType::from_code(type_buf[0])
            .ok_or(FrameError::UnknownType(type_buf[0]))?;

        let mut len_buf = [0u8; 8];
        read_field(&mut reader, &mut len_buf, "path length", cipher)?;
        let path_len = LittleEndian::read_u64(&len_buf);
        if path_len > MAX_PATH_LEN {
            return Err(FrameError::PathTooLong(path_len));
        }

        let mut path_buf = vec![0u8; path_len as usize];
        read_field(&mut reader, &mut path_buf, "path", cipher)?;
        let path = String::from_utf8(path_buf).map_err(|_| FrameError::InvalidPath)?;

        read_field(&mut reader, &mut len_buf, "payload length", cipher)?;
        let payload_len = LittleEndian::read_u64(&len_buf);

        let mut crc_buf = [0u8; 4];
        read_field(&mut reader, &mut crc_buf, "checksum", cipher)?;
        let crc32 = LittleEndian::read_u32(&crc_buf);

        let mut block = [0u8; META_BLOCK_SIZE];
        read_field(&mut reader, &mut block, "attributes", cipher)?;
        let attrs = decode_meta_block(&block);

        let payload = read_payload(&mut reader, payload_len, cipher)?;

        Ok(Some(Self {
            meta: FrameMeta { file_type, path, payload_len, crc32, attrs },
            payload,
        }))
    }
}

pub fn encode_meta_block(attrs: &FileAttributes) -> [u8; META_BLOCK_SIZE] {
    let mut block = [0u8; META_BLOCK_SIZE];
    LittleEndian::write_u32(&mut block[0..4],   attrs.mode);
    LittleEndian::write_u32(&mut block[4..8],   attrs.uid);
    LittleEndian::write_u32(&mut block[8..12],  attrs.gid);
    LittleEndian::write_i64(&mut block[12..20], attrs.mtime);
    block
}

pub fn decode_meta_block(block: &[u8; META_BLOCK_SIZE]) -> FileAttributes {
    FileAttributes {
        mode:  LittleEndian::read_u32(&block[0..4]),
        uid:   LittleEndian::read_u32(&block[4..8]),
        gid:   LittleEndian::read_u32(&block[8..12]),
        mtime: LittleEndian::read_i64(&block[12..20]),
    }
}

// ── Read helpers ─────────────────────────────────────────────────────────────

/// `false` when the stream is exhausted before the first byte.
fn read_first_byte<R: Read>(reader: &mut R, buf: &mut [u8; 1]) -> Result<bool, FrameError> {
    loop {
        match reader.read(buf) {
            Ok(0)  => return Ok(false),
            Ok(_)  => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_field<R: Read>(
    reader: &mut R,
    buf:    &mut [u8],
    field:  &'static str,
    cipher: &mut dyn CipherStream,
) -> Result<(), FrameError> {
    reader.read_exact(buf).map_err(|e| truncated_or_io(e, field))?;
    cipher.apply(buf);
    Ok(())
}

/// Reads through `take` so a corrupt length cannot force a huge allocation
/// up front.
fn read_payload<R: Read>(reader: &mut R, len: u64, cipher: &mut dyn CipherStream) -> Result<Vec<u8>, FrameError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let cap = usize::try_from(len).map_err(|_| FrameError::PayloadTooLarge(len))?;
    let mut payload = Vec::with_capacity(cap.min(1 << 20));
    reader.by_ref().take(len).read_to_end(&mut payload)?;
    if (payload.len() as u64) < len {
        return Err(FrameError::Truncated { field: "payload" });
    }
    cipher.apply(&mut payload);
    Ok(payload)
}

fn truncated_or_io(e: io::Error, field: &'static str) -> FrameError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FrameError::Truncated { field }
    } else {
        FrameError::Io(e)
    }
}
