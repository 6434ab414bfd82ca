//! Device transports.
//!
//! A `Transport` delivers batches of register writes to the sound chip. Two
//! hardware shapes are provided, selected when the session is built:
//!
//! - `HandshakeTransport` drives the chip's parallel bus through an I/O
//!   expander: every write is a multi-step strobe sequence followed by a
//!   bounded busy poll.
//! - `BlockTransport` marshals a batch into one opaque block write to a
//!   co-processor that sequences the writes itself.
//!
//! `MemoryTransport` keeps batches in memory for dry runs and tests.
//!
//! The bus primitives themselves (`ExpanderBus`, `BlockBus`) are traits so
//! the physical driver lives outside this crate.
use crate::replay::WriteBatch;
use std::io;
use thiserror::Error;

pub mod block;
pub mod handshake;
pub mod memory;

pub use block::{BlockBus, BlockConfig, BlockTransport};
pub use handshake::{ExpanderBus, HandshakeConfig, HandshakeTransport, PollOutcome};
pub use memory::MemoryTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The device did not clear its busy flag within the poll bound.
    #[error("device still busy after {attempts} polls (last write 0x{address:02X}=0x{value:02X})")]
    Timeout { address: u8, value: u8, attempts: u32 },

    /// The bus or device could not be reached.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Adapter for `map_err` that tags an I/O error with what was being done.
    pub fn io(context: &'static str) -> impl FnOnce(io::Error) -> TransportError {
        move |source| TransportError::Io { context, source }
    }
}

/// Sink for batches of register writes.
pub trait Transport {
    /// Prepare the device before the first batch (bus directions, reset).
    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Deliver `batch` in order. The batch is consumed whether or not the
    /// call succeeds.
    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError>;

    /// Largest batch the transport accepts in one call, if bounded.
    fn max_batch_len(&self) -> Option<usize> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError> {
        (**self).send(batch)
    }

    fn max_batch_len(&self) -> Option<usize> {
        (**self).max_batch_len()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError> {
        (**self).send(batch)
    }

    fn max_batch_len(&self) -> Option<usize> {
        (**self).max_batch_len()
    }
}
