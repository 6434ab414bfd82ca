//! Trace tag block parsing.
//!
//! Version 3 traces carry a PSF-style tag block: the ASCII marker
//! `"[S98]"`, an optional UTF-8 byte order mark, then `key=value` lines
//! separated by `0x0A`, terminated by a NUL byte or the end of the buffer.
//! Older traces store a single NUL-terminated title at the tag offset.
//!
//! Tags are diagnostic only. Parsing is tolerant: unknown keys are kept,
//! lines without `=` are ignored and invalid UTF-8 is decoded lossily.

const TAG_MARKER: &[u8] = b"[S98]";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceTags {
    /// Key/value pairs in file order. Keys are lowercased.
    pub entries: Vec<(String, String)>,
}

impl TraceTags {
    /// Look up the first value stored under `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    pub fn artist(&self) -> Option<&str> {
        self.get("artist")
    }

    pub fn game(&self) -> Option<&str> {
        self.get("game")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a tag block starting at the beginning of `bytes`.
///
/// `version` is the header's version byte; it selects between the v3
/// key/value layout and the legacy single-title layout.
pub(crate) fn parse_tags(bytes: &[u8], version: u8) -> TraceTags {
    let block = match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };

    if version < b'3' || !block.starts_with(TAG_MARKER) {
        let title = String::from_utf8_lossy(block).trim().to_string();
        let entries = if title.is_empty() {
            Vec::new()
        } else {
            vec![("title".to_string(), title)]
        };
        return TraceTags { entries };
    }

    let mut body = &block[TAG_MARKER.len()..];
    if let Some(rest) = body.strip_prefix(UTF8_BOM) {
        body = rest;
    }

    let entries = body
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            let line = String::from_utf8_lossy(line);
            let (k, v) = line.trim_end_matches('\r').split_once('=')?;
            let k = k.trim().to_ascii_lowercase();
            (!k.is_empty()).then(|| (k, v.trim().to_string()))
        })
        .collect();

    TraceTags { entries }
}
