//! Trace header and device descriptor parsing.
//!
//! The fixed header occupies the first 32 bytes of the buffer; all
//! integers are little-endian:
//!
//! | offset | field |
//! |--------|-------|
//! | 0x00 | magic `"S98"` + version byte |
//! | 0x04 | timer numerator |
//! | 0x08 | timer denominator |
//! | 0x0C | compression (must be 0) |
//! | 0x10 | tag block offset |
//! | 0x14 | event data offset |
//! | 0x18 | loop point offset (0 = no loop) |
//! | 0x1C | device count |
//!
//! `device_count` descriptors of 16 bytes each follow at 0x20. Devices are
//! reported for diagnostics only; replay assumes a single device.
use crate::binutil::{FormatError, read_slice, read_u8_at, read_u32_le_at};
use crate::replay::timing::TickRate;

/// Three-byte identifier at the start of every trace.
pub const TRACE_MAGIC: &[u8; 3] = b"S98";

/// Size of the fixed header, excluding device descriptors.
pub const TRACE_HEADER_SIZE: usize = 0x20;

/// Size of one device descriptor record.
pub const DEVICE_INFO_SIZE: usize = 0x10;

/// Timer numerator used when the header stores 0.
pub(crate) const DEFAULT_TIMER_NUMERATOR: u32 = 10;

/// Sound chip family named by a device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    None,
    /// YM2149
    Psg,
    /// YM2203
    Opn,
    /// YM2612
    Opn2,
    /// YM2608
    Opna,
    /// YM2151
    Opm,
    /// YM2413
    Opll,
    /// YM3526
    Opl,
    /// YM3812
    Opl2,
    /// YMF262
    Opl3,
    /// AY-3-8910
    Ay8910,
    /// SN76489
    Dcsg,
    Unknown(u32),
}

impl From<u32> for DeviceKind {
    fn from(v: u32) -> Self {
        match v {
            0 => DeviceKind::None,
            1 => DeviceKind::Psg,
            2 => DeviceKind::Opn,
            3 => DeviceKind::Opn2,
            4 => DeviceKind::Opna,
            5 => DeviceKind::Opm,
            6 => DeviceKind::Opll,
            7 => DeviceKind::Opl,
            8 => DeviceKind::Opl2,
            9 => DeviceKind::Opl3,
            15 => DeviceKind::Ay8910,
            16 => DeviceKind::Dcsg,
            other => DeviceKind::Unknown(other),
        }
    }
}

impl DeviceKind {
    /// Human-readable chip name.
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::None => "none",
            DeviceKind::Psg => "PSG (YM2149)",
            DeviceKind::Opn => "OPN (YM2203)",
            DeviceKind::Opn2 => "OPN2 (YM2612)",
            DeviceKind::Opna => "OPNA (YM2608)",
            DeviceKind::Opm => "OPM (YM2151)",
            DeviceKind::Opll => "OPLL (YM2413)",
            DeviceKind::Opl => "OPL (YM3526)",
            DeviceKind::Opl2 => "OPL2 (YM3812)",
            DeviceKind::Opl3 => "OPL3 (YMF262)",
            DeviceKind::Ay8910 => "PSG (AY-3-8910)",
            DeviceKind::Dcsg => "DCSG (SN76489)",
            DeviceKind::Unknown(_) => "unknown",
        }
    }
}

/// One device descriptor record following the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub kind: DeviceKind,
    /// Master clock in Hz.
    pub clock: u32,
    /// Pan / routing bits.
    pub pan: u32,
    pub reserved: u32,
}

/// Validated trace header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    /// Version byte following the magic (ASCII `'1'`..=`'3'`).
    pub version: u8,
    /// Timer numerator as stored (0 is reported by `tick_rate` as 10).
    pub timer_numerator: u32,
    pub timer_denominator: u32,
    pub compression: u32,
    pub tag_offset: u32,
    pub event_data_offset: u32,
    /// Loop point offset; 0 means the trace does not loop.
    pub loop_point_offset: u32,
    /// Device count as stored (0 means one implicit default device).
    pub device_count: u32,
    pub devices: Vec<DeviceDescriptor>,
}

impl TraceHeader {
    /// Playback rate of one base delay tick (`numerator / denominator` seconds).
    pub fn tick_rate(&self) -> TickRate {
        let numerator = if self.timer_numerator == 0 {
            DEFAULT_TIMER_NUMERATOR
        } else {
            self.timer_numerator
        };
        TickRate::new(numerator, self.timer_denominator)
    }

    /// Loop point offset, or `None` when the trace does not loop.
    pub fn loop_point(&self) -> Option<usize> {
        (self.loop_point_offset != 0).then_some(self.loop_point_offset as usize)
    }

    /// Tag block offset, or `None` when the trace carries no tags.
    pub fn tag_block(&self) -> Option<usize> {
        (self.tag_offset != 0).then_some(self.tag_offset as usize)
    }

    /// Number of bytes occupied by the header and its descriptor table.
    pub fn header_len(&self) -> usize {
        TRACE_HEADER_SIZE + self.devices.len() * DEVICE_INFO_SIZE
    }
}

/// Parse and validate the header at the start of `bytes`.
///
/// Validation is all-or-nothing: the buffer must hold the fixed header and
/// the full descriptor table, the magic and version must match, the
/// denominator must be non-zero, compression must be 0, and every declared
/// offset must lie inside the buffer.
pub fn parse_trace_header(bytes: &[u8]) -> Result<TraceHeader, FormatError> {
    if bytes.len() < TRACE_HEADER_SIZE {
        return Err(FormatError::HeaderTooShort {
            needed: TRACE_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let magic = read_slice(bytes, 0x00, 3, "magic")?;
    if magic != TRACE_MAGIC {
        let mut id: [u8; 3] = [0; 3];
        id.copy_from_slice(magic);
        return Err(FormatError::InvalidMagic(id));
    }

    let version = read_u8_at(bytes, 0x03, "version")?;
    if !(b'1'..=b'3').contains(&version) {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let timer_numerator = read_u32_le_at(bytes, 0x04, "timer_numerator")?;
    let timer_denominator = read_u32_le_at(bytes, 0x08, "timer_denominator")?;
    if timer_denominator == 0 {
        return Err(FormatError::ZeroDenominator);
    }

    let compression = read_u32_le_at(bytes, 0x0C, "compression")?;
    if compression != 0 {
        return Err(FormatError::UnsupportedCompression(compression));
    }

    let tag_offset = read_u32_le_at(bytes, 0x10, "tag_offset")?;
    let event_data_offset = read_u32_le_at(bytes, 0x14, "event_data_offset")?;
    let loop_point_offset = read_u32_le_at(bytes, 0x18, "loop_point_offset")?;
    let device_count = read_u32_le_at(bytes, 0x1C, "device_count")?;

    check_offset(bytes, "event_data_offset", event_data_offset)?;
    if loop_point_offset != 0 {
        check_offset(bytes, "loop_point_offset", loop_point_offset)?;
    }
    if tag_offset != 0 {
        check_offset(bytes, "tag_offset", tag_offset)?;
    }

    let table_len = (device_count as usize)
        .checked_mul(DEVICE_INFO_SIZE)
        .and_then(|n| n.checked_add(TRACE_HEADER_SIZE));
    match table_len {
        Some(end) if end <= bytes.len() => {}
        _ => {
            return Err(FormatError::OffsetOutOfRange {
                field: "device_count",
                offset: device_count as usize,
                len: bytes.len(),
            });
        }
    }

    let mut devices = Vec::with_capacity(device_count as usize);
    for i in 0..device_count as usize {
        let base = TRACE_HEADER_SIZE + i * DEVICE_INFO_SIZE;
        devices.push(DeviceDescriptor {
            kind: DeviceKind::from(read_u32_le_at(bytes, base, "device_type")?),
            clock: read_u32_le_at(bytes, base + 0x04, "device_clock")?,
            pan: read_u32_le_at(bytes, base + 0x08, "device_pan")?,
            reserved: read_u32_le_at(bytes, base + 0x0C, "device_reserved")?,
        });
    }

    Ok(TraceHeader {
        version,
        timer_numerator,
        timer_denominator,
        compression,
        tag_offset,
        event_data_offset,
        loop_point_offset,
        device_count,
        devices,
    })
}

fn check_offset(bytes: &[u8], field: &'static str, offset: u32) -> Result<(), FormatError> {
    if offset as usize >= bytes.len() {
        return Err(FormatError::OffsetOutOfRange {
            field,
            offset: offset as usize,
            len: bytes.len(),
        });
    }
    Ok(())
}
