//! Bounds-aware byte cursor used to frame file sections.

use std::borrow::Cow;

use crate::error::{CmoError, Result};

/// Read/write cursor over a contiguous byte region.
///
/// The region is either borrowed (for example a memory-mapped file, never
/// written) or owned. Every access is checked against the region length.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Borrow an existing region for reading.
    #[must_use]
    pub fn borrowed(data: &'a [u8]) -> Self {
        Self {
            buf: Cow::Borrowed(data),
            pos: 0,
        }
    }

    /// Take ownership of a region.
    #[must_use]
    pub fn owned(data: Vec<u8>) -> Self {
        Self {
            buf: Cow::Owned(data),
            pos: 0,
        }
    }

    /// Allocate a zero-filled region of `len` bytes for writing.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self::owned(vec![0; len])
    }

    /// Current absolute position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total region length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left after the current position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Whole region.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes from the current position to the end, without advancing.
    #[must_use]
    pub fn peek(&self) -> &[u8] {
        self.buf.get(self.pos..).unwrap_or_default()
    }

    /// Consume the cursor and return the region.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf.into_owned()
    }

    fn check(&self, at: usize, n: usize) -> Result<()> {
        match at.checked_add(n) {
            Some(end) if end <= self.buf.len() => Ok(()),
            _ => Err(CmoError::invalid_file(format!(
                "access of {n} bytes at offset {at} exceeds buffer of {} bytes",
                self.buf.len()
            ))),
        }
    }

    /// Move to an absolute position (may equal the length).
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        self.check(pos, 0)?;
        self.pos = pos;
        Ok(())
    }

    /// Advance by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check(self.pos, n)?;
        self.pos += n;
        Ok(())
    }

    /// Borrow the next `n` bytes and advance.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.check(self.pos, n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..start + n])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|value| value as i32)
    }

    /// Copy `src` at the current position and advance.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.check(self.pos, src.len())?;
        let start = self.pos;
        self.buf.to_mut()[start..start + src.len()].copy_from_slice(src);
        self.pos += src.len();
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }
}
