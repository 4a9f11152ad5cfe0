//! Archive header: 8-byte magic followed by a 1-byte compression flag.
//!
//! The magic names the cipher the archive was written with; the header itself
//! is never encrypted.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::codec::{CodecError, CompressionMode};
use crate::crypto::CipherMode;

pub const MAGIC_NONE: &[u8; 8] = b"MINIBK10";
pub const MAGIC_XOR:  &[u8; 8] = b"MINIBK_X";
pub const MAGIC_RC4:  &[u8; 8] = b"MINIBK_R";

/// Magic plus flag byte.
pub const HEADER_SIZE: usize = 9;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Unknown archive format (magic {})", String::from_utf8_lossy(.0))]
    UnknownFormat([u8; 8]),
    #[error(transparent)]
    Compression(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub cipher:      CipherMode,
    pub compression: CompressionMode,
}

impl ArchiveHeader {
    pub fn magic(&self) -> &'static [u8; 8] {
        match self.cipher {
            CipherMode::None => MAGIC_NONE,
            CipherMode::Xor  => MAGIC_XOR,
            CipherMode::Rc4  => MAGIC_RC4,
        }
    }

    pub fn cipher_from_magic(magic: &[u8; 8]) -> Option<CipherMode> {
        match magic {
            m if m == MAGIC_NONE => Some(CipherMode::None),
            m if m == MAGIC_XOR  => Some(CipherMode::Xor),
            m if m == MAGIC_RC4  => Some(CipherMode::Rc4),
            _                    => None,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.magic())?;
        writer.write_u8(self.compression.flag())?;
        Ok(())
    }

    /// A stream shorter than the magic is reported as an unknown format.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let mut magic = [0u8; 8];
        if let Err(e) = reader.read_exact(&mut magic) {
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => HeaderError::UnknownFormat(magic),
                _                            => HeaderError::Io(e),
            });
        }
        let cipher = Self::cipher_from_magic(&magic)
            .ok_or(HeaderError::UnknownFormat(magic))?;
        let compression = CompressionMode::from_flag(reader.read_u8()?)?;
        Ok(Self { cipher, compression })
    }
}
