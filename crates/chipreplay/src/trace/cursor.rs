//! Bounds-checked read cursor over the event stream.
//!
//! The cursor position is the interpreter's program counter. Every read
//! validates the remaining length, so a truncated stream surfaces as
//! `FormatError::UnexpectedEof` instead of reading past the buffer.
use crate::binutil::{FormatError, read_slice, read_u8_at};

/// Longest variable-length count accepted (5 * 7 bits covers `u32`).
pub const MAX_VARINT_LEN: usize = 5;

/// Decode a little-endian base-128 count starting at `off`.
///
/// Each byte contributes its low seven bits at an increasing shift; a set
/// high bit means another byte follows. Returns the decoded value and the
/// number of bytes consumed.
pub fn decode_varint(bytes: &[u8], off: usize) -> Result<(u32, usize), FormatError> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let b = read_u8_at(bytes, off + i, "extended_delay_count")?;
        value |= u64::from(b & 0x7F) << (7 * i);
        if b & 0x80 == 0 {
            return u32::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| FormatError::VarintOverflow { offset: off });
        }
    }
    Err(FormatError::VarintOverflow { offset: off })
}

#[derive(Debug, Clone)]
pub struct EventCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> EventCursor<'a> {
    /// Create a cursor over `bytes` positioned at `pos`.
    pub fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Read one byte and advance past it.
    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, FormatError> {
        let b = read_u8_at(self.bytes, self.pos, context)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read two bytes and advance past them.
    pub fn read_pair(&mut self, context: &'static str) -> Result<(u8, u8), FormatError> {
        let s = read_slice(self.bytes, self.pos, 2, context)?;
        let pair = (s[0], s[1]);
        self.pos += 2;
        Ok(pair)
    }

    /// Advance by `n` bytes, failing if fewer remain.
    pub fn skip(&mut self, n: usize, context: &'static str) -> Result<(), FormatError> {
        read_slice(self.bytes, self.pos, n, context)?;
        self.pos += n;
        Ok(())
    }

    /// Decode a variable-length count at the cursor and leave the cursor one
    /// past its last byte.
    pub fn read_varint(&mut self) -> Result<u32, FormatError> {
        let (value, consumed) = decode_varint(self.bytes, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }
}
