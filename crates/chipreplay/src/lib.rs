//! chipreplay: timed replay of sound-chip register-write traces
//!
//! `chipreplay` plays a recorded register-write log (the S98 trace format)
//! against a live sound chip, reproducing the original timing as closely as
//! the host allows.
//!
//! Key pieces:
//! - `trace::TraceBuffer` validates the header once and keeps the bytes
//!   immutable for the whole session.
//! - `trace::PlaybackInterpreter` walks the variable-length opcode stream
//!   and yields write, delay, loop and end events in stream order.
//! - `replay::TimingEngine` converts delays into drift-corrected waits.
//! - `replay::WriteBatcher` groups writes between timing boundaries.
//! - `transport::Transport` abstracts the device: a handshake bus with
//!   busy polling, or block transfers to a co-processor.
//! - `replay::ReplaySession` drives all of the above on one thread.
//!
//! Example: replaying a trace into memory
//!
//! ```rust
//! use chipreplay::replay::{ReplayConfig, ReplaySession};
//! use chipreplay::trace::{TraceBuffer, WriteIntent};
//! use chipreplay::transport::MemoryTransport;
//!
//! // Header: 1/100000 s per tick, events at 0x20, no loop, no devices.
//! let mut bytes = b"S983".to_vec();
//! for v in [1u32, 100_000, 0, 0, 0x20, 0, 0] {
//!     bytes.extend_from_slice(&v.to_le_bytes());
//! }
//! // write 0x08=0x00, one tick, write 0x08=0x78, end
//! bytes.extend_from_slice(&[0x00, 0x08, 0x00, 0xFF, 0x00, 0x08, 0x78, 0xFD]);
//!
//! let trace = TraceBuffer::parse(bytes).unwrap();
//! let mut session =
//!     ReplaySession::new(&trace, MemoryTransport::new(), ReplayConfig::default()).unwrap();
//! let summary = session.run().unwrap();
//!
//! assert_eq!(summary.delay_ticks, 1);
//! assert_eq!(
//!     session.transport().batches(),
//!     &[vec![WriteIntent::new(0x08, 0x00)], vec![WriteIntent::new(0x08, 0x78)]]
//! );
//! ```
mod binutil;
pub mod meta;
pub mod replay;
pub mod trace;
pub mod transport;

pub use binutil::FormatError;
pub use replay::{ReplayConfig, ReplayError, ReplaySession, ReplaySummary, TransportErrorPolicy};
pub use trace::{PlaybackInterpreter, TraceBuffer, TraceEvent, TraceHeader, WriteIntent};
pub use transport::{Transport, TransportError};
