use crate::binutil::FormatError;
use crate::meta::{TraceTags, parse_tags};
use crate::trace::header::{TraceHeader, parse_trace_header};

/// An immutable trace: the raw bytes plus the header validated from them.
///
/// The buffer is parsed once and never mutated afterwards, so it can be
/// shared by reference between the interpreter and any diagnostics code for
/// the lifetime of a playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceBuffer {
    bytes: Vec<u8>,
    header: TraceHeader,
}

impl TraceBuffer {
    /// Validate `bytes` and take ownership of them.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, FormatError> {
        let header = parse_trace_header(&bytes)?;
        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// The whole buffer, header included. Event offsets index into this slice.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the tag block, if the header declares one.
    ///
    /// Tags are diagnostic only; a malformed tag block never prevents replay.
    pub fn tags(&self) -> Option<TraceTags> {
        let off = self.header.tag_block()?;
        Some(parse_tags(&self.bytes[off..], self.header.version))
    }
}

impl TryFrom<Vec<u8>> for TraceBuffer {
    type Error = FormatError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        TraceBuffer::parse(bytes)
    }
}

impl TryFrom<&[u8]> for TraceBuffer {
    type Error = FormatError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        TraceBuffer::parse(bytes.to_vec())
    }
}
