//! Stream ciphers for minibk archives.
//!
//! Two keyed variants plus identity, all transforming a buffer in place:
//!
//! | Mode | Magic      | State                                              |
//! |------|------------|----------------------------------------------------|
//! | None | `MINIBK10` | none                                               |
//! | XOR  | `MINIBK_X` | none: every call restarts the password cycle at 0  |
//! | RC4  | `MINIBK_R` | one keystream for the whole archive                |
//!
//! The writer and reader call [`CipherStream::apply`] once per frame field
//! (type, pathLen, path, payloadLen, crc32, metaBlock, payload).  For XOR
//! that means each field is keyed from the first password byte again; for RC4
//! the keystream simply continues.  Both behaviours are part of the format.
//!
//! Neither cipher authenticates anything.  Integrity comes from the per-frame
//! CRC32, which is computed before encryption.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("RC4 requires a non-empty key")]
    EmptyKey,
    #[error("Unknown cipher mode '{0}' (expected none, xor or rc4)")]
    UnknownMode(String),
}

// ── CipherMode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    #[default]
    None,
    Xor,
    Rc4,
}

impl CipherMode {
    pub fn name(self) -> &'static str {
        match self {
            CipherMode::None => "none",
            CipherMode::Xor  => "xor",
            CipherMode::Rc4  => "rc4",
        }
    }

    /// Mode actually used for a write: no password means no encryption.
    pub fn resolve(self, password: &[u8]) -> Self {
        if password.is_empty() { CipherMode::None } else { self }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherMode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(CipherMode::None),
            "xor"  => Ok(CipherMode::Xor),
            "rc4"  => Ok(CipherMode::Rc4),
            _      => Err(CryptoError::UnknownMode(s.to_owned())),
        }
    }
}

// ── CipherStream trait ───────────────────────────────────────────────────────

pub trait CipherStream: Send {
    fn mode(&self) -> CipherMode;
    /// Encrypt or decrypt `buf` in place.  Encryption and decryption are the
    /// same operation for every variant.
    fn apply(&mut self, buf: &mut [u8]);
}

pub struct NullCipher;

impl CipherStream for NullCipher {
    fn mode(&self) -> CipherMode { CipherMode::None }
    fn apply(&mut self, _buf: &mut [u8]) {}
}

/// Repeating-key XOR.  Holds no position between calls.
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }
}

impl CipherStream for XorCipher {
    fn mode(&self) -> CipherMode { CipherMode::Xor }

    fn apply(&mut self, buf: &mut [u8]) {
        if self.key.is_empty() {
            return;
        }
        for (b, k) in buf.iter_mut().zip(self.key.iter().cycle()) {
            *b ^= k;
        }
    }
}

/// RC4 keystream.  Key scheduling runs once in [`Rc4Cipher::new`]; every
/// subsequent [`CipherStream::apply`] continues from where the last one
/// stopped.
pub struct Rc4Cipher {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4Cipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        let mut s = [0u8; 256];
        for (idx, slot) in s.iter_mut().enumerate() {
            *slot = idx as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Ok(Self { s, i: 0, j: 0 })
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[idx as usize]
    }
}

impl CipherStream for Rc4Cipher {
    fn mode(&self) -> CipherMode { CipherMode::Rc4 }

    fn apply(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b ^= self.next_byte();
        }
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Build the single cipher instance used for one pack or unpack pass.
///
/// `mode` must already be resolved against the password; callers that want
/// "empty password disables encryption" go through [`CipherMode::resolve`].
pub fn new_cipher(mode: CipherMode, password: &[u8]) -> Result<Box<dyn CipherStream>, CryptoError> {
    match mode {
        CipherMode::None => Ok(Box::new(NullCipher)),
        CipherMode::Xor  => Ok(Box::new(XorCipher::new(password))),
        CipherMode::Rc4  => Ok(Box::new(Rc4Cipher::new(password)?)),
    }
}
