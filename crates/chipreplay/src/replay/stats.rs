use std::time::{Duration, Instant};

/// Default number of opcodes between throughput reports.
pub const DEFAULT_REPORT_INTERVAL: u64 = 10_000;

/// Session-scoped counters.
///
/// Updated only by the replay loop that owns them; the throughput window is
/// reset every time a report is emitted.
#[derive(Debug, Clone)]
pub struct ReplayStats {
    started: Instant,
    window_start: Instant,
    window_writes: u64,
    last_report_opcodes: u64,
    pub writes: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub delay_ticks: u64,
    pub loops: u32,
}

/// Final figures of a replay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub opcodes: u64,
    pub unknown_opcodes: u64,
    pub writes: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub delay_ticks: u64,
    pub loops: u32,
    /// Nominal playback time covered by the delays.
    pub nominal: Duration,
    /// Wall-clock time spent in the session.
    pub elapsed: Duration,
    pub late_delays: u64,
}

/// Throughput over one reporting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub writes: u64,
    pub per_second: f64,
}

impl ReplayStats {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            window_start: now,
            window_writes: 0,
            last_report_opcodes: 0,
            writes: 0,
            batches: 0,
            failed_batches: 0,
            delay_ticks: 0,
            loops: 0,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Count a batch the transport accepted.
    pub fn record_batch(&mut self, writes: usize) {
        self.batches += 1;
        self.writes += writes as u64;
        self.window_writes += writes as u64;
    }

    /// Close the throughput window if `opcodes` crossed the next multiple of
    /// `interval` since the last report.
    pub fn poll_report(&mut self, opcodes: u64, interval: u64, now: Instant) -> Option<Throughput> {
        let interval = interval.max(1);
        if opcodes / interval <= self.last_report_opcodes / interval {
            return None;
        }
        let secs = now.saturating_duration_since(self.window_start).as_secs_f64();
        let per_second = if secs > 0.0 {
            self.window_writes as f64 / secs
        } else {
            0.0
        };
        let report = Throughput {
            writes: self.window_writes,
            per_second,
        };
        self.last_report_opcodes = opcodes;
        self.window_writes = 0;
        self.window_start = now;
        Some(report)
    }
}
