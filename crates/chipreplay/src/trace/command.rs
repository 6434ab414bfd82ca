//! Event-stream opcodes and the events the interpreter emits for them.

/// Single base delay tick.
pub const OP_DELAY: u8 = 0xFF;
/// Extended delay; a variable-length count follows.
pub const OP_DELAY_EXTENDED: u8 = 0xFE;
/// End of stream (or loop back when a loop point is set).
pub const OP_END: u8 = 0xFD;
/// Register write; address and value bytes follow.
pub const OP_WRITE: u8 = 0x00;

/// Number of bytes skipped when an unknown opcode is met.
pub const UNKNOWN_OPCODE_STRIDE: usize = 3;

/// A single register write: `address <- value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteIntent {
    pub address: u8,
    pub value: u8,
}

impl WriteIntent {
    pub fn new(address: u8, value: u8) -> Self {
        Self { address, value }
    }
}

/// One step of interpretation, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A register write to hand to the batcher.
    Write(WriteIntent),
    /// Advance the playback clock by `ticks` base ticks.
    Delay { ticks: u32 },
    /// The stream looped back to `offset`; `iteration` counts loop-backs from 1.
    Loop { offset: usize, iteration: u32 },
    /// The stream ended; nothing follows.
    End,
}

impl TraceEvent {
    /// Whether the event closes the current batch window.
    pub fn is_boundary(&self) -> bool {
        !matches!(self, TraceEvent::Write(_))
    }
}
