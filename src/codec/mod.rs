//! Payload compressors.
//!
//! The archive header carries a single compression flag that applies to every
//! frame: `0` stores payloads verbatim, `1` run-length encodes them.
//!
//! # RLE wire format
//! A sequence of `(run_length: u8, value: u8)` pairs.  Runs longer than 255
//! are split across several pairs.  There is no literal escape, so data
//! without repeats doubles in size.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown compression mode '{0}' (expected none or rle)")]
    UnknownMode(String),
    #[error("Unknown compression flag {0:#04x}")]
    UnknownFlag(u8),
}

// ── CompressionMode ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[default]
    None,
    Rle,
}

impl CompressionMode {
    /// Header flag byte.
    pub fn flag(self) -> u8 {
        match self {
            CompressionMode::None => 0,
            CompressionMode::Rle  => 1,
        }
    }

    pub fn from_flag(flag: u8) -> Result<Self, CodecError> {
        match flag {
            0 => Ok(CompressionMode::None),
            1 => Ok(CompressionMode::Rle),
            f => Err(CodecError::UnknownFlag(f)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMode::None => "none",
            CompressionMode::Rle  => "rle",
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionMode {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(CompressionMode::None),
            "rle"  => Ok(CompressionMode::Rle),
            _      => Err(CodecError::UnknownMode(s.to_owned())),
        }
    }
}

// ── Compressor trait ─────────────────────────────────────────────────────────

pub trait Compressor: Send + Sync {
    fn mode(&self) -> CompressionMode;
    fn compress(&self, data: &[u8]) -> Vec<u8>;
    fn decompress(&self, data: &[u8]) -> Vec<u8>;
}

pub struct NullCompressor;

impl Compressor for NullCompressor {
    fn mode(&self) -> CompressionMode { CompressionMode::None }
    fn compress(&self, data: &[u8])   -> Vec<u8> { data.to_vec() }
    fn decompress(&self, data: &[u8]) -> Vec<u8> { data.to_vec() }
}

pub struct RleCompressor;

impl Compressor for RleCompressor {
    fn mode(&self) -> CompressionMode { CompressionMode::Rle }
    fn compress(&self, data: &[u8])   -> Vec<u8> { rle_encode(data) }
    fn decompress(&self, data: &[u8]) -> Vec<u8> { rle_decode(data) }
}

pub fn get_compressor(mode: CompressionMode) -> Box<dyn Compressor> {
    match mode {
        CompressionMode::None => Box::new(NullCompressor),
        CompressionMode::Rle  => Box::new(RleCompressor),
    }
}

// ── RLE ──────────────────────────────────────────────────────────────────────

pub fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 2);
    let mut i   = 0usize;

    while i < data.len() {
        let value = data[i];
        let mut run = 1usize;
        while i + run < data.len() && data[i + run] == value && run < u8::MAX as usize {
            run += 1;
        }
        out.push(run as u8);
        out.push(value);
        i += run;
    }
    out
}

/// Expand `(count, value)` pairs.  A dangling final byte is dropped.
pub fn rle_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for pair in data.chunks_exact(2) {
        out.extend(std::iter::repeat(pair[1]).take(pair[0] as usize));
    }
    out
}
