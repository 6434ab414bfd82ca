use crate::replay::batcher::{WriteBatch, WriteBatcher};
use crate::replay::stats::{ReplayStats, ReplaySummary};
use crate::replay::timing::{Clock, SystemClock, TimingEngine};
use crate::replay::{ReplayConfig, ReplayError, TransportErrorPolicy};
use crate::trace::{PlaybackInterpreter, TraceBuffer, TraceEvent};
use crate::transport::Transport;

/// One playback of a trace against a transport.
///
/// The session exclusively owns the interpreter, batcher, timing engine and
/// statistics; it borrows the trace immutably. Everything runs on the
/// calling thread: `run` blocks in the timing engine's sleeps and in the
/// transport's busy polls until the stream ends or a fatal error occurs.
///
/// # Examples
///
/// ```
/// use chipreplay::replay::{ReplayConfig, ReplaySession};
/// use chipreplay::trace::TraceBuffer;
/// use chipreplay::transport::MemoryTransport;
///
/// let mut bytes = b"S983".to_vec();
/// for v in [1u32, 100_000, 0, 0, 0x20, 0, 0] {
///     bytes.extend_from_slice(&v.to_le_bytes());
/// }
/// bytes.extend_from_slice(&[0x00, 0x08, 0x00, 0x00, 0x08, 0x78, 0xFF, 0xFD]);
/// let trace = TraceBuffer::parse(bytes).unwrap();
///
/// let mut session =
///     ReplaySession::new(&trace, MemoryTransport::new(), ReplayConfig::default()).unwrap();
/// let summary = session.run().unwrap();
/// assert_eq!(summary.writes, 2);
/// assert_eq!(session.transport().sends(), 1);
/// ```
pub struct ReplaySession<'a, T: Transport, C: Clock = SystemClock> {
    interpreter: PlaybackInterpreter<'a>,
    batcher: WriteBatcher,
    timing: TimingEngine<C>,
    transport: T,
    stats: ReplayStats,
    config: ReplayConfig,
}

impl<'a, T: Transport> ReplaySession<'a, T, SystemClock> {
    /// Build a session paced by the system clock.
    pub fn new(trace: &'a TraceBuffer, transport: T, config: ReplayConfig) -> Result<Self, ReplayError> {
        Self::with_clock(trace, transport, SystemClock, config)
    }
}

impl<'a, T: Transport, C: Clock> ReplaySession<'a, T, C> {
    /// Build a session paced by `clock`.
    ///
    /// Fails before any transport I/O when the configuration is invalid or
    /// the trace's tick rate is undefined. The batch capacity is lowered to
    /// the transport's limit when it advertises one.
    pub fn with_clock(
        trace: &'a TraceBuffer,
        transport: T,
        clock: C,
        config: ReplayConfig,
    ) -> Result<Self, ReplayError> {
        config.validate()?;
        let timing = TimingEngine::new(trace.header().tick_rate(), clock)?;

        let capacity = match transport.max_batch_len() {
            Some(max) => config.batch_capacity.min(max.max(1)),
            None => config.batch_capacity,
        };

        let mut interpreter =
            PlaybackInterpreter::new(trace).with_extended_delay_bias(config.extended_delay_bias);
        interpreter.set_loop_count(config.loop_count);

        let stats = ReplayStats::new(timing.clock().now());
        Ok(Self {
            interpreter,
            batcher: WriteBatcher::new(capacity),
            timing,
            transport,
            stats,
            config,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn interpreter(&self) -> &PlaybackInterpreter<'a> {
        &self.interpreter
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    pub fn batch_capacity(&self) -> usize {
        self.batcher.capacity()
    }

    /// Open the transport and play until the stream ends.
    pub fn run(&mut self) -> Result<ReplaySummary, ReplayError> {
        self.transport.open()?;
        self.timing.restart();
        while self.step()? {}
        Ok(self.summary())
    }

    /// Process one event. Returns `false` once the stream is done.
    ///
    /// Callers driving the session step by step must open the transport
    /// themselves (`run` does it).
    pub fn step(&mut self) -> Result<bool, ReplayError> {
        let event = match self.interpreter.next_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("{} (at 0x{:X})", e, self.interpreter.position());
                // The format error is what ends the session; a failed flush is only logged.
                if let Err(flush_err) = self.flush() {
                    tracing::error!("flush before stopping failed: {}", flush_err);
                }
                return Err(e.into());
            }
        };

        let running = match event {
            None => {
                self.flush()?;
                false
            }
            Some(event) => {
                if event.is_boundary() {
                    self.flush()?;
                }
                match event {
                    TraceEvent::Write(intent) => {
                        if let Some(batch) = self.batcher.push(intent) {
                            self.send(batch)?;
                        }
                        true
                    }
                    TraceEvent::Delay { ticks } => {
                        self.timing.delay(ticks)?;
                        self.stats.delay_ticks += u64::from(ticks);
                        true
                    }
                    TraceEvent::Loop { .. } => {
                        self.stats.loops += 1;
                        true
                    }
                    TraceEvent::End => false,
                }
            }
        };

        let now = self.timing.clock().now();
        if let Some(report) =
            self.stats
                .poll_report(self.interpreter.opcodes(), self.config.report_interval, now)
        {
            tracing::info!("{} OPS : {:.1} OPS/sec", report.writes, report.per_second);
        }

        Ok(running)
    }

    /// Snapshot of the session's counters.
    pub fn summary(&self) -> ReplaySummary {
        let playback = self.timing.playback_clock();
        ReplaySummary {
            opcodes: self.interpreter.opcodes(),
            unknown_opcodes: self.interpreter.unknown_opcodes(),
            writes: self.stats.writes,
            batches: self.stats.batches,
            failed_batches: self.stats.failed_batches,
            delay_ticks: self.stats.delay_ticks,
            loops: self.stats.loops,
            nominal: playback.nominal,
            elapsed: self
                .timing
                .clock()
                .now()
                .saturating_duration_since(self.stats.started()),
            late_delays: self.timing.late_delays(),
        }
    }

    fn flush(&mut self) -> Result<(), ReplayError> {
        match self.batcher.flush() {
            Some(batch) => self.send(batch),
            None => Ok(()),
        }
    }

    fn send(&mut self, batch: WriteBatch) -> Result<(), ReplayError> {
        let len = batch.len();
        match self.transport.send(batch) {
            Ok(()) => {
                self.stats.record_batch(len);
                Ok(())
            }
            Err(e) => {
                self.stats.failed_batches += 1;
                tracing::error!("batch of {} writes failed: {}", len, e);
                match self.config.error_policy {
                    TransportErrorPolicy::Abort => Err(e.into()),
                    TransportErrorPolicy::Continue => Ok(()),
                }
            }
        }
    }
}
