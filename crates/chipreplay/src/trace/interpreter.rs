//! Opcode state machine over the event stream.
//!
//! `PlaybackInterpreter` walks the stream starting at the header's event
//! data offset and yields one `TraceEvent` per meaningful opcode, in stream
//! order:
//!
//! | opcode | event |
//! |--------|-------|
//! | `0xFF` | `Delay { ticks: 1 }` |
//! | `0xFE` | `Delay { ticks: count + bias }` (count is a variable-length integer) |
//! | `0xFD` | `Loop` when a loop point is set, otherwise `End` |
//! | `0x00` | `Write(address, value)` |
//! | other  | logged, skipped with a fixed 3-byte stride, never yielded |
//!
//! # Iterator Behavior
//!
//! The interpreter implements `Iterator`. After `TraceEvent::End` has been
//! yielded the state is `Done` and the iterator returns `None`. A format
//! error (for example a stream that runs off the end of the buffer without
//! an end opcode) is yielded once and also moves the state to `Done`.
//!
//! # Examples
//!
//! ```
//! use chipreplay::trace::{PlaybackInterpreter, TraceBuffer, TraceEvent, WriteIntent};
//!
//! let mut bytes = b"S983".to_vec();
//! for v in [10u32, 1000, 0, 0, 0x20, 0, 0] {
//!     bytes.extend_from_slice(&v.to_le_bytes());
//! }
//! bytes.extend_from_slice(&[0x00, 0x08, 0x01, 0xFF, 0xFD]);
//!
//! let trace = TraceBuffer::parse(bytes).unwrap();
//! let events: Vec<TraceEvent> = PlaybackInterpreter::new(&trace)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(
//!     events,
//!     vec![
//!         TraceEvent::Write(WriteIntent::new(0x08, 0x01)),
//!         TraceEvent::Delay { ticks: 1 },
//!         TraceEvent::End,
//!     ]
//! );
//! ```
use crate::binutil::FormatError;
use crate::trace::buffer::TraceBuffer;
use crate::trace::command::{
    OP_DELAY, OP_DELAY_EXTENDED, OP_END, OP_WRITE, TraceEvent, UNKNOWN_OPCODE_STRIDE,
    WriteIntent,
};
use crate::trace::cursor::EventCursor;

/// Ticks added to a decoded extended-delay count by default.
///
/// A short-form delay is one tick and the extended form only makes sense
/// for two or more, so the stored count is biased by two.
pub const DEFAULT_EXTENDED_DELAY_BIAS: u32 = 2;

/// Interpreter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Running,
    /// Set right after a loop-back; the next step resumes `Running` at the loop point.
    Looping,
    /// Terminal.
    Done,
}

#[derive(Debug, Clone)]
pub struct PlaybackInterpreter<'a> {
    cursor: EventCursor<'a>,
    state: PlaybackState,
    loop_point: Option<usize>,
    /// Maximum playthroughs (None = loop forever)
    loop_count: Option<u32>,
    /// Loop-backs taken so far
    current_loops: u32,
    extended_delay_bias: u32,
    /// Opcodes read, unknown ones included
    opcodes: u64,
    unknown_opcodes: u64,
    /// Offset of the opcode behind the most recent event
    event_offset: usize,
}

impl<'a> PlaybackInterpreter<'a> {
    /// Create an interpreter positioned at the trace's event data offset.
    pub fn new(trace: &'a TraceBuffer) -> Self {
        let header = trace.header();
        let start = header.event_data_offset as usize;
        Self {
            cursor: EventCursor::new(trace.bytes(), start),
            state: PlaybackState::Running,
            loop_point: header.loop_point(),
            loop_count: None,
            current_loops: 0,
            extended_delay_bias: DEFAULT_EXTENDED_DELAY_BIAS,
            opcodes: 0,
            unknown_opcodes: 0,
            event_offset: start,
        }
    }

    /// Set the number of ticks added to every decoded extended-delay count.
    pub fn with_extended_delay_bias(mut self, bias: u32) -> Self {
        self.extended_delay_bias = bias;
        self
    }

    /// Sets the playthrough limit.
    ///
    /// `Some(n)` stops at the end opcode of the `n`th playthrough even when a
    /// loop point is set (`Some(0)` behaves like `Some(1)`); `None` loops
    /// forever.
    pub fn set_loop_count(&mut self, count: Option<u32>) {
        self.loop_count = count;
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current cursor position (the program counter).
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Offset of the opcode that produced the most recent event.
    pub fn event_offset(&self) -> usize {
        self.event_offset
    }

    /// Loop-backs taken so far.
    pub fn current_loop_count(&self) -> u32 {
        self.current_loops
    }

    /// Opcodes read so far, unknown ones included.
    pub fn opcodes(&self) -> u64 {
        self.opcodes
    }

    pub fn unknown_opcodes(&self) -> u64 {
        self.unknown_opcodes
    }

    /// Interpret opcodes until one produces an event.
    ///
    /// Returns `Ok(None)` once the interpreter is `Done`.
    pub fn next_event(&mut self) -> Result<Option<TraceEvent>, FormatError> {
        let result = self.step();
        if result.is_err() {
            self.state = PlaybackState::Done;
        }
        result
    }

    fn step(&mut self) -> Result<Option<TraceEvent>, FormatError> {
        loop {
            match self.state {
                PlaybackState::Done => return Ok(None),
                PlaybackState::Looping => self.state = PlaybackState::Running,
                PlaybackState::Running => {}
            }

            let start = self.cursor.position();
            self.event_offset = start;
            let opcode = self.cursor.read_u8("opcode")?;
            self.opcodes += 1;

            match opcode {
                OP_DELAY => return Ok(Some(TraceEvent::Delay { ticks: 1 })),
                OP_DELAY_EXTENDED => {
                    let count = self.cursor.read_varint()?;
                    let ticks = count.saturating_add(self.extended_delay_bias).max(1);
                    return Ok(Some(TraceEvent::Delay { ticks }));
                }
                OP_END => return Ok(Some(self.handle_end())),
                OP_WRITE => {
                    let (address, value) = self.cursor.read_pair("register_write")?;
                    return Ok(Some(TraceEvent::Write(WriteIntent { address, value })));
                }
                other => {
                    self.cursor.seek(start);
                    self.cursor.skip(UNKNOWN_OPCODE_STRIDE, "unknown_opcode")?;
                    self.unknown_opcodes += 1;
                    tracing::warn!("unknown opcode 0x{:02X} at offset 0x{:X}", other, start);
                }
            }
        }
    }

    fn handle_end(&mut self) -> TraceEvent {
        let limit_reached = self
            .loop_count
            .is_some_and(|max| self.current_loops + 1 >= max);

        match self.loop_point {
            Some(offset) if !limit_reached => {
                self.current_loops += 1;
                self.cursor.seek(offset);
                self.state = PlaybackState::Looping;
                tracing::info!("loop #{} -> 0x{:X}", self.current_loops, offset);
                TraceEvent::Loop {
                    offset,
                    iteration: self.current_loops,
                }
            }
            _ => {
                self.state = PlaybackState::Done;
                tracing::info!("end of stream at 0x{:X}", self.event_offset);
                TraceEvent::End
            }
        }
    }
}

impl Iterator for PlaybackInterpreter<'_> {
    type Item = Result<TraceEvent, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}
