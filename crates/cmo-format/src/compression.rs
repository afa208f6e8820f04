//! zlib pack/unpack and Adler-32 checksums for file sections.

use std::io::{Read, Write};

use adler2::Adler32;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{CmoError, Result};

/// Compression level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 5;

/// Compress `data` into a zlib stream at `level` (1..=9).
pub fn pack(data: &[u8], level: u32) -> Result<Vec<u8>> {
    if !(1..=9).contains(&level) {
        return Err(CmoError::invalid_parameter(format!(
            "compression level {level} outside 1..=9"
        )));
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|err| CmoError::compression(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| CmoError::compression(err.to_string()))
}

/// Inflate a zlib stream into exactly `unpacked_len` bytes.
///
/// Streams that inflate to more than `unpacked_len` bytes are rejected. A
/// shorter stream is zero-padded to the declared length.
pub fn unpack(data: &[u8], unpacked_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(unpacked_len)
        .map_err(|_| CmoError::out_of_memory(format!("{unpacked_len} byte section")))?;
    let mut decoder = ZlibDecoder::new(data).take(unpacked_len as u64 + 1);
    decoder
        .read_to_end(&mut out)
        .map_err(|err| CmoError::compression(err.to_string()))?;
    if out.len() > unpacked_len {
        return Err(CmoError::compression(format!(
            "stream inflates past declared size {unpacked_len}"
        )));
    }
    out.resize(unpacked_len, 0);
    Ok(out)
}

/// Adler-32 of `data`, continuing from `seed`.
///
/// A seed of `0` matches the engine's own convention, which differs from the
/// textbook initial value of `1`.
#[must_use]
pub fn compute_crc(data: &[u8], seed: u32) -> u32 {
    let mut hasher = Adler32::from_checksum(seed);
    hasher.write_slice(data);
    hasher.checksum()
}

/// Adler-32 over several slices in order, starting from seed `0`.
#[must_use]
pub fn compute_crc_chain(parts: &[&[u8]]) -> u32 {
    parts.iter().fold(0, |crc, part| compute_crc(part, crc))
}
