//! Trace utilities and event-stream interpretation used by this crate.
//!
//! This module exposes the immutable `TraceBuffer` (raw bytes plus a
//! validated header), the bounds-checked `EventCursor`, the event types
//! produced while walking the stream, and the `PlaybackInterpreter` state
//! machine that turns opcodes into write and delay events.
mod buffer;
pub mod command;
pub mod cursor;
mod header;
pub mod interpreter;

pub use buffer::TraceBuffer;
pub use command::{TraceEvent, WriteIntent};
pub use cursor::EventCursor;
pub use header::{
    DEVICE_INFO_SIZE, DeviceDescriptor, DeviceKind, TRACE_HEADER_SIZE, TRACE_MAGIC, TraceHeader,
    parse_trace_header,
};
pub use interpreter::{PlaybackInterpreter, PlaybackState};
