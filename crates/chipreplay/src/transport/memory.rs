use crate::replay::WriteBatch;
use crate::transport::{Transport, TransportError};

/// Transport that keeps batches in memory instead of touching hardware.
///
/// Used for dry runs (`counting`, which only tallies writes) and to observe
/// exactly what a session would have sent (`new`, which retains batches).
#[derive(Debug, Default)]
pub struct MemoryTransport {
    batches: Vec<WriteBatch>,
    retain: bool,
    opened: bool,
    sends: u64,
    writes: u64,
    max_batch_len: Option<usize>,
}

impl MemoryTransport {
    /// A transport that records every batch it receives.
    pub fn new() -> Self {
        Self {
            retain: true,
            ..Default::default()
        }
    }

    /// A transport that only counts sends and writes.
    pub fn counting() -> Self {
        Self::default()
    }

    /// Advertise a batch limit, as a bounded hardware transport would.
    pub fn with_max_batch_len(mut self, max: usize) -> Self {
        self.max_batch_len = Some(max);
        self
    }

    pub fn batches(&self) -> &[WriteBatch] {
        &self.batches
    }

    pub fn sends(&self) -> u64 {
        self.sends
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.opened = true;
        Ok(())
    }

    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError> {
        self.sends += 1;
        self.writes += batch.len() as u64;
        if self.retain {
            self.batches.push(batch);
        }
        Ok(())
    }

    fn max_batch_len(&self) -> Option<usize> {
        self.max_batch_len
    }
}
