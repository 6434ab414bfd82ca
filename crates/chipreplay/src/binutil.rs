//! Utilities used by parsers: format error type and bounds-checked byte readers.
use thiserror::Error;

/// Error returned when a trace buffer cannot be decoded.
///
/// Header validation is all-or-nothing: any of these variants raised while
/// parsing the header means playback never starts and no transport call is
/// made. Variants raised from the event stream (`UnexpectedEof`,
/// `VarintOverflow`) end the running session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The buffer is shorter than the fixed header.
    #[error("header too short: {available} bytes (need at least {needed})")]
    HeaderTooShort { needed: usize, available: usize },

    /// The three-byte identifier did not match `"S98"`.
    #[error("invalid magic: {0:02X?}")]
    InvalidMagic([u8; 3]),

    /// The version byte following the magic is not supported.
    #[error("unsupported version: 0x{0:02X}")]
    UnsupportedVersion(u8),

    /// The timer denominator is zero, so the tick rate is undefined.
    #[error("timer denominator is zero")]
    ZeroDenominator,

    /// The compression field names an encoding this crate cannot replay.
    #[error("unsupported compression: 0x{0:08X}")]
    UnsupportedCompression(u32),

    /// A header offset points outside of the buffer.
    ///
    /// - `field` names the header field (for example `"event_data_offset"`).
    /// - `offset` is the declared offset.
    /// - `len` is the buffer length.
    #[error("{field} 0x{offset:X} is outside the buffer (length 0x{len:X})")]
    OffsetOutOfRange {
        field: &'static str,
        offset: usize,
        len: usize,
    },

    /// A read ran past the end of the buffer.
    ///
    /// - `offset` is the index that was attempted to be accessed.
    /// - `needed` is the number of bytes required for the operation.
    /// - `available` is the number of bytes left from `offset`.
    /// - `context` names the logical location of the read.
    #[error(
        "unexpected end of data at 0x{offset:X} in {context} (needed {needed} bytes, available {available})"
    )]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
        context: &'static str,
    },

    /// A variable-length count did not terminate within five bytes.
    #[error("variable-length count at 0x{offset:X} does not fit in 32 bits")]
    VarintOverflow { offset: usize },
}

/// Read a 32-bit little-endian unsigned integer from `bytes` at `off`.
///
/// Returns `Err(FormatError::UnexpectedEof)` when the buffer is too short.
pub fn read_u32_le_at(bytes: &[u8], off: usize, context: &'static str) -> Result<u32, FormatError> {
    let s = read_slice(bytes, off, 4, context)?;
    let mut tmp: [u8; 4] = [0; 4];
    tmp.copy_from_slice(s);
    Ok(u32::from_le_bytes(tmp))
}

/// Read a single byte from `bytes` at `off`.
pub fn read_u8_at(bytes: &[u8], off: usize, context: &'static str) -> Result<u8, FormatError> {
    bytes.get(off).copied().ok_or(FormatError::UnexpectedEof {
        offset: off,
        needed: 1,
        available: 0,
        context,
    })
}

/// Return a borrowed slice of length `len` starting at `off` from `bytes`.
///
/// Returns `Err(FormatError::UnexpectedEof)` when the requested range exceeds
/// the available buffer. Offset arithmetic never wraps.
pub fn read_slice<'a>(
    bytes: &'a [u8],
    off: usize,
    len: usize,
    context: &'static str,
) -> Result<&'a [u8], FormatError> {
    let end = off.checked_add(len);
    match end {
        Some(end) if end <= bytes.len() => Ok(&bytes[off..end]),
        _ => Err(FormatError::UnexpectedEof {
            offset: off,
            needed: len,
            // Report the remaining number of bytes from `off` to the end of the buffer.
            available: bytes.len().saturating_sub(off),
            context,
        }),
    }
}
