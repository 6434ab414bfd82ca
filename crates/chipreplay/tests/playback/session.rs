use crate::{FakeClock, TestTrace, capture_logs};
use chipreplay::replay::{ReplayConfig, ReplayError, ReplaySession, TransportErrorPolicy, WriteBatch};
use chipreplay::FormatError;
use chipreplay::trace::{TraceBuffer, WriteIntent};
use chipreplay::transport::handshake::{CTRL_A0, CTRL_WR, GPIOA, GPIOB, IODIRA, IODIRB};
use chipreplay::transport::{
    BlockBus, BlockConfig, BlockTransport, ExpanderBus, HandshakeConfig, HandshakeTransport,
    MemoryTransport, Transport, TransportError,
};
use std::io;
use std::time::{Duration, Instant};
use tracing_subscriber::filter::LevelFilter;

fn writes(n: u8) -> Vec<u8> {
    (0..n).flat_map(|i| [0x00, i, i.wrapping_mul(3)]).collect()
}

fn parse(t: &TestTrace) -> TraceBuffer {
    TraceBuffer::parse(t.build()).unwrap()
}

#[test]
fn writes_are_flushed_at_capacity_and_before_delays() {
    let mut events = writes(20);
    events.extend_from_slice(&[0xFF, 0xFD]);
    let trace = parse(&TestTrace::with_events(&events));

    let clock = FakeClock::new();
    let mut session =
        ReplaySession::with_clock(&trace, MemoryTransport::new(), clock, ReplayConfig::default())
            .unwrap();
    session.run().unwrap();

    let transport = session.into_transport();
    assert!(transport.is_opened());
    let sizes: Vec<usize> = transport.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![16, 4]);

    let sent: Vec<WriteIntent> = transport.batches().concat();
    let expected: Vec<WriteIntent> = (0..20u8)
        .map(|i| WriteIntent::new(i, i.wrapping_mul(3)))
        .collect();
    assert_eq!(sent, expected);
}

#[test]
fn end_and_loop_flush_pending_writes() {
    let t = TestTrace {
        events: vec![0x00, 0x01, 0x02, 0x00, 0x03, 0x04, 0xFD],
        loop_at: Some(3),
        ..Default::default()
    };
    let trace = parse(&t);
    let config = ReplayConfig {
        loop_count: Some(2),
        ..Default::default()
    };
    let mut session =
        ReplaySession::with_clock(&trace, MemoryTransport::new(), FakeClock::new(), config)
            .unwrap();
    let summary = session.run().unwrap();

    assert_eq!(
        session.transport().batches(),
        &[
            vec![WriteIntent::new(0x01, 0x02), WriteIntent::new(0x03, 0x04)],
            vec![WriteIntent::new(0x03, 0x04)],
        ]
    );
    assert_eq!(summary.loops, 1);
    assert_eq!(summary.writes, 3);
}

#[test]
fn summary_counts_everything() {
    let mut events = writes(20);
    events.extend_from_slice(&[0xFF, 0xFE, 0x05, 0x7A, 0x00, 0x00, 0xFD]);
    let trace = parse(&TestTrace::with_events(&events));

    let mut session = ReplaySession::with_clock(
        &trace,
        MemoryTransport::counting(),
        FakeClock::new(),
        ReplayConfig::default(),
    )
    .unwrap();
    let summary = session.run().unwrap();

    assert_eq!(summary.writes, 20);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failed_batches, 0);
    assert_eq!(summary.delay_ticks, 8);
    assert_eq!(summary.unknown_opcodes, 1);
    assert_eq!(summary.opcodes, 24);
    assert_eq!(summary.loops, 0);
    // 8 ticks at 10/1000 s
    assert_eq!(summary.nominal, Duration::from_millis(80));
    assert_eq!(summary.late_delays, 0);
    assert!(session.transport().batches().is_empty());
    assert_eq!(session.transport().writes(), 20);
}

#[test]
fn elapsed_time_tracks_nominal_time() {
    let k = 50;
    let mut events = Vec::new();
    for _ in 0..k {
        events.extend_from_slice(&[0x00, 0x08, 0x00, 0xFF]);
    }
    events.push(0xFD);
    let trace = parse(&TestTrace::with_events(&events));

    let clock = FakeClock::new();
    let mut session = ReplaySession::with_clock(
        &trace,
        MemoryTransport::counting(),
        clock.clone(),
        ReplayConfig::default(),
    )
    .unwrap();
    let summary = session.run().unwrap();

    let tick = Duration::from_millis(10);
    assert_eq!(summary.nominal, tick * k);
    assert_eq!(clock.elapsed(), tick * k);
    assert_eq!(clock.sleeps(), k);
}

#[test]
fn sleep_overshoot_does_not_accumulate() {
    let k = 100;
    let events: Vec<u8> = std::iter::repeat_n(0xFF, k as usize)
        .chain([0xFD])
        .collect();
    let trace = parse(&TestTrace::with_events(&events));

    let overshoot = Duration::from_millis(1);
    let clock = FakeClock::with_overshoot(overshoot);
    let mut session = ReplaySession::with_clock(
        &trace,
        MemoryTransport::counting(),
        clock.clone(),
        ReplayConfig::default(),
    )
    .unwrap();
    session.run().unwrap();

    let tick = Duration::from_millis(10);
    let elapsed = clock.elapsed();
    assert!(elapsed >= tick * k);
    assert!(elapsed <= tick * k + overshoot, "drifted to {:?}", elapsed);
}

#[test]
fn system_clock_paces_playback() {
    let t = TestTrace {
        numerator: 1,
        denominator: 1000,
        events: std::iter::repeat_n(0xFF, 20).chain([0xFD]).collect(),
        ..Default::default()
    };
    let trace = parse(&t);

    let start = Instant::now();
    let mut session =
        ReplaySession::new(&trace, MemoryTransport::counting(), ReplayConfig::default()).unwrap();
    let summary = session.run().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.nominal, Duration::from_millis(20));
    assert!(elapsed >= Duration::from_millis(20));
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
}

/// Transport that fails every `fail_every`-th send.
#[derive(Default)]
struct FlakyTransport {
    fail_every: u32,
    sends: u32,
    delivered: Vec<WriteBatch>,
}

impl Transport for FlakyTransport {
    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError> {
        self.sends += 1;
        if self.sends % self.fail_every == 0 {
            return Err(TransportError::Io {
                context: "block write",
                source: io::Error::new(io::ErrorKind::TimedOut, "no ack"),
            });
        }
        self.delivered.push(batch);
        Ok(())
    }
}

fn write_tick_trace(n: u8) -> TraceBuffer {
    let events: Vec<u8> = (0..n)
        .flat_map(|i| [0x00, i, 0x00, 0xFF])
        .chain([0xFD])
        .collect();
    parse(&TestTrace::with_events(&events))
}

#[test]
fn transport_error_aborts_by_default() {
    let trace = write_tick_trace(4);
    let transport = FlakyTransport {
        fail_every: 2,
        ..Default::default()
    };
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), ReplayConfig::default())
            .unwrap();

    let err = session.run().unwrap_err();
    assert!(matches!(err, ReplayError::Transport(TransportError::Io { .. })));
    assert_eq!(session.transport().sends, 2);
    assert_eq!(session.stats().failed_batches, 1);
}

#[test]
fn transport_error_can_be_skipped() {
    let trace = write_tick_trace(4);
    let transport = FlakyTransport {
        fail_every: 2,
        ..Default::default()
    };
    let config = ReplayConfig {
        error_policy: TransportErrorPolicy::Continue,
        ..Default::default()
    };
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), config).unwrap();
    let summary = session.run().unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failed_batches, 2);
    assert_eq!(summary.writes, 2);
    assert_eq!(
        session.transport().delivered,
        vec![vec![WriteIntent::new(0, 0)], vec![WriteIntent::new(2, 0)]]
    );
}

#[test]
fn invalid_config_is_rejected() {
    let trace = write_tick_trace(1);
    let config = ReplayConfig {
        batch_capacity: 0,
        ..Default::default()
    };
    let result = ReplaySession::new(&trace, MemoryTransport::new(), config);
    assert!(matches!(result, Err(ReplayError::Config(_))));
}

#[test]
fn format_error_flushes_pending_writes_first() {
    // two writes, then a truncated write
    let trace = parse(&TestTrace::with_events(&[0x00, 0x01, 0x01, 0x00, 0x02, 0x02, 0x00, 0x03]));
    let mut session = ReplaySession::with_clock(
        &trace,
        MemoryTransport::new(),
        FakeClock::new(),
        ReplayConfig::default(),
    )
    .unwrap();

    let err = session.run().unwrap_err();
    assert!(matches!(err, ReplayError::Format(_)));
    assert_eq!(
        session.transport().batches(),
        &[vec![WriteIntent::new(0x01, 0x01), WriteIntent::new(0x02, 0x02)]]
    );
}

#[test]
fn format_error_wins_over_failed_flush() {
    // one write, then a truncated write
    let trace = parse(&TestTrace::with_events(&[0x00, 0x01, 0x01, 0x00, 0x03]));
    let transport = FlakyTransport {
        fail_every: 1,
        ..Default::default()
    };
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), ReplayConfig::default())
            .unwrap();

    let (result, lines) = capture_logs(LevelFilter::ERROR, || session.run());
    assert!(matches!(
        result,
        Err(ReplayError::Format(FormatError::UnexpectedEof { .. }))
    ));
    assert_eq!(session.stats().failed_batches, 1);
    assert!(lines.iter().any(|l| l.contains("flush before stopping failed")));
}

#[test]
fn capacity_is_lowered_to_transport_limit() {
    let mut events = writes(10);
    events.push(0xFD);
    let trace = parse(&TestTrace::with_events(&events));

    let session = ReplaySession::with_clock(
        &trace,
        MemoryTransport::new().with_max_batch_len(4),
        FakeClock::new(),
        ReplayConfig::default(),
    )
    .unwrap();
    assert_eq!(session.batch_capacity(), 4);
}

#[derive(Default)]
struct RecordingBlockBus {
    blocks: Vec<(u8, Vec<u8>)>,
}

impl BlockBus for RecordingBlockBus {
    fn write_block(&mut self, command: u8, data: &[u8]) -> io::Result<()> {
        self.blocks.push((command, data.to_vec()));
        Ok(())
    }
}

#[test]
fn block_transport_end_to_end() {
    let mut events = writes(10);
    events.push(0xFD);
    let trace = parse(&TestTrace::with_events(&events));

    let transport = BlockTransport::new(
        RecordingBlockBus::default(),
        BlockConfig {
            command: 0x40,
            max_pairs: 4,
        },
    );
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), ReplayConfig::default())
            .unwrap();
    assert_eq!(session.batch_capacity(), 4);
    session.run().unwrap();

    let bus = session.into_transport().into_bus();
    let sizes: Vec<usize> = bus.blocks.iter().map(|(_, d)| d.len()).collect();
    assert_eq!(sizes, vec![8, 8, 4]);
    assert!(bus.blocks.iter().all(|(c, _)| *c == 0x40));
    assert_eq!(&bus.blocks[0].1[..4], &[0x00, 0x00, 0x01, 0x03]);
}

/// Simulated expander wired to a chip. Latches the data bus on every `/WR`
/// strobe and answers status reads from `busy`.
#[derive(Default)]
struct FakeChipBus {
    data: u8,
    data_output: bool,
    control_output: bool,
    latched: Vec<(bool, u8)>,
    busy: bool,
    status_reads: u32,
}

impl FakeChipBus {
    fn register_writes(&self) -> Vec<WriteIntent> {
        self.latched
            .chunks(2)
            .map(|pair| {
                assert!(!pair[0].0 && pair[1].0, "address/value strobes out of order");
                WriteIntent::new(pair[0].1, pair[1].1)
            })
            .collect()
    }
}

impl ExpanderBus for FakeChipBus {
    fn write_reg8(&mut self, register: u8, value: u8) -> io::Result<()> {
        match register {
            IODIRA => self.data_output = value == 0x00,
            IODIRB => self.control_output = value == 0x00,
            GPIOA => self.data = value,
            GPIOB => {
                // /WR is active low
                if value & CTRL_WR == 0 && self.data_output {
                    self.latched.push((value & CTRL_A0 != 0, self.data));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read_reg8(&mut self, register: u8) -> io::Result<u8> {
        assert_eq!(register, GPIOA);
        self.status_reads += 1;
        Ok(if self.busy { 0x80 } else { 0x00 })
    }
}

#[test]
fn handshake_transport_end_to_end() {
    let trace = parse(&TestTrace::with_events(&[
        0x00, 0x08, 0x00, 0x00, 0x28, 0x7F, 0xFF, 0x00, 0x08, 0x78, 0xFD,
    ]));
    let mut bus = FakeChipBus::default();
    let transport = HandshakeTransport::new(&mut bus, HandshakeConfig::default());
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), ReplayConfig::default())
            .unwrap();
    session.run().unwrap();
    drop(session);

    assert!(bus.control_output);
    assert_eq!(
        bus.register_writes(),
        vec![
            WriteIntent::new(0x08, 0x00),
            WriteIntent::new(0x28, 0x7F),
            WriteIntent::new(0x08, 0x78),
        ]
    );
    assert_eq!(bus.status_reads, 3);
}

#[test]
fn handshake_busy_chip_times_out() {
    let trace = parse(&TestTrace::with_events(&[0x00, 0x08, 0x00, 0xFD]));
    let mut bus = FakeChipBus {
        busy: true,
        ..Default::default()
    };
    let config = HandshakeConfig {
        busy_retries: 3,
        poll_timeout: Duration::from_secs(5),
    };
    let transport = HandshakeTransport::new(&mut bus, config);
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), ReplayConfig::default())
            .unwrap();

    let err = session.run().unwrap_err();
    match err {
        ReplayError::Transport(TransportError::Timeout {
            address,
            value,
            attempts,
        }) => {
            assert_eq!((address, value, attempts), (0x08, 0x00, 3));
        }
        other => panic!("unexpected error: {other}"),
    }
    drop(session);
    assert_eq!(bus.status_reads, 3);
}

#[test]
fn failed_batch_log_names_the_attempted_write() {
    let trace = parse(&TestTrace::with_events(&[
        0x00, 0x01, 0x02, 0x00, 0x0F, 0x80, 0xFD,
    ]));
    let mut bus = FakeChipBus {
        busy: true,
        ..Default::default()
    };
    let config = HandshakeConfig {
        busy_retries: 2,
        poll_timeout: Duration::from_secs(5),
    };
    let transport = HandshakeTransport::new(&mut bus, config);
    let mut session =
        ReplaySession::with_clock(&trace, transport, FakeClock::new(), ReplayConfig::default())
            .unwrap();

    let (result, lines) = capture_logs(LevelFilter::ERROR, || session.run());
    assert!(result.is_err());
    let failure = lines
        .iter()
        .find(|l| l.contains("batch of 2 writes failed"))
        .expect("batch failure logged");
    assert!(failure.contains("0x01=0x02"), "{}", failure);
    assert!(!failure.contains("0x0F"), "{}", failure);
}
