//! Replay session: pacing, batching and delivery of interpreted events.
//!
//! `ReplaySession` ties the pieces together. Events from the
//! `PlaybackInterpreter` are routed in stream order: writes go to the
//! `WriteBatcher`, every other event flushes pending writes to the
//! `Transport` first, and delays are then handed to the `TimingEngine`.
pub mod batcher;
mod session;
pub mod stats;
pub mod timing;

pub use batcher::{DEFAULT_BATCH_CAPACITY, WriteBatch, WriteBatcher};
pub use session::ReplaySession;
pub use stats::{DEFAULT_REPORT_INTERVAL, ReplayStats, ReplaySummary, Throughput};
pub use timing::{Clock, PlaybackClock, SystemClock, TickRate, TimingEngine, TimingError};

use crate::binutil::FormatError;
use crate::trace::interpreter::DEFAULT_EXTENDED_DELAY_BIAS;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("trace format error: {0}")]
    Format(#[from] FormatError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("timing error: {0}")]
    Timing(#[from] TimingError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// What the session does when a batch cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportErrorPolicy {
    /// End the session with the error.
    #[default]
    Abort,
    /// Log the error, drop the batch and carry on with the next event.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Writes accumulated before a forced flush.
    pub batch_capacity: usize,
    /// Ticks added to every decoded extended-delay count.
    pub extended_delay_bias: u32,
    /// Opcodes between throughput reports.
    pub report_interval: u64,
    /// Playthrough limit (None = loop forever).
    pub loop_count: Option<u32>,
    pub error_policy: TransportErrorPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            extended_delay_bias: DEFAULT_EXTENDED_DELAY_BIAS,
            report_interval: DEFAULT_REPORT_INTERVAL,
            loop_count: None,
            error_policy: TransportErrorPolicy::Abort,
        }
    }
}

impl ReplayConfig {
    pub(crate) fn validate(&self) -> Result<(), ReplayError> {
        if self.batch_capacity == 0 {
            return Err(ReplayError::Config("batch capacity must be at least 1".into()));
        }
        if self.report_interval == 0 {
            return Err(ReplayError::Config("report interval must be at least 1".into()));
        }
        Ok(())
    }
}
