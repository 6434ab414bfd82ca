use crate::trace::WriteIntent;

/// Default number of writes accumulated before a forced flush.
pub const DEFAULT_BATCH_CAPACITY: usize = 16;

/// Writes handed to a transport in one call, in stream order.
pub type WriteBatch = Vec<WriteIntent>;

/// Bounded accumulator for consecutive register writes.
///
/// Writes between two timing boundaries form one "simultaneous update"
/// window. The batcher hands out a batch when it reaches capacity, and the
/// caller drains it with `flush` at every delay, loop or end event, so a
/// write is never deferred past a timing boundary.
#[derive(Debug)]
pub struct WriteBatcher {
    pending: Vec<WriteIntent>,
    capacity: usize,
}

impl WriteBatcher {
    /// Create a batcher; `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a write. Returns the full batch once capacity is reached.
    pub fn push(&mut self, intent: WriteIntent) -> Option<WriteBatch> {
        self.pending.push(intent);
        if self.pending.len() >= self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// Hand out whatever is pending, if anything.
    pub fn flush(&mut self) -> Option<WriteBatch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> WriteBatch {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity))
    }
}

impl Default for WriteBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}
