//! Block-transfer transport to a co-processor.
//!
//! A batch is flattened into `address, value, address, value, ...` and sent
//! as one SMBus-style block write. The far end sequences the writes, so no
//! per-write handshake is performed. A block carries at most 32 data bytes;
//! longer batches are split.
use crate::replay::WriteBatch;
use crate::transport::{Transport, TransportError};
use std::io;

/// Largest payload of one block write, in bytes.
pub const MAX_BLOCK_LEN: usize = 32;

/// Block-write access to the far-end device.
pub trait BlockBus {
    fn write_block(&mut self, command: u8, data: &[u8]) -> io::Result<()>;
}

impl<B: BlockBus + ?Sized> BlockBus for &mut B {
    fn write_block(&mut self, command: u8, data: &[u8]) -> io::Result<()> {
        (**self).write_block(command, data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockConfig {
    /// Command byte sent ahead of every block.
    pub command: u8,
    /// Register pairs per block, clamped to `1..=MAX_BLOCK_LEN / 2`.
    pub max_pairs: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            command: 0,
            max_pairs: MAX_BLOCK_LEN / 2,
        }
    }
}

#[derive(Debug)]
pub struct BlockTransport<B> {
    bus: B,
    command: u8,
    max_pairs: usize,
    buf: Vec<u8>,
}

impl<B: BlockBus> BlockTransport<B> {
    pub fn new(bus: B, config: BlockConfig) -> Self {
        let max_pairs = config.max_pairs.clamp(1, MAX_BLOCK_LEN / 2);
        Self {
            bus,
            command: config.command,
            max_pairs,
            buf: Vec::with_capacity(max_pairs * 2),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}

impl<B: BlockBus> Transport for BlockTransport<B> {
    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError> {
        for chunk in batch.chunks(self.max_pairs) {
            self.buf.clear();
            for w in chunk {
                self.buf.push(w.address);
                self.buf.push(w.value);
            }
            self.bus
                .write_block(self.command, &self.buf)
                .map_err(TransportError::io("block write"))?;
        }
        Ok(())
    }

    fn max_batch_len(&self) -> Option<usize> {
        Some(self.max_pairs)
    }
}
