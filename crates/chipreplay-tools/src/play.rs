use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chipreplay::replay::{ReplayConfig, ReplaySession, ReplaySummary, TransportErrorPolicy};
use chipreplay::trace::TraceBuffer;
use chipreplay::transport::{
    BlockConfig, BlockTransport, HandshakeConfig, HandshakeTransport, MemoryTransport, Transport,
};
use clap::ValueEnum;

use crate::i2c;

/// How register writes reach the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Drive the chip bus through an I/O expander, polling busy per write
    Handshake,
    /// Send batches as block writes to a co-processor
    Block,
}

#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub mode: Mode,
    pub bus: PathBuf,
    pub address: u16,
    pub command: u8,
    pub busy_retries: u32,
    pub poll_timeout_ms: u64,
    pub dry_run: bool,
    pub config: ReplayConfig,
}

fn open_transport(opts: &PlayOptions) -> Result<Box<dyn Transport>> {
    if opts.dry_run {
        return Ok(Box::new(MemoryTransport::counting()));
    }
    let device = i2c::open(&opts.bus, opts.address)?;
    tracing::debug!(
        "opened {} at 0x{:02X}",
        opts.bus.display(),
        device.address()
    );
    let transport: Box<dyn Transport> = match opts.mode {
        Mode::Handshake => Box::new(HandshakeTransport::new(
            device,
            HandshakeConfig {
                busy_retries: opts.busy_retries,
                poll_timeout: Duration::from_millis(opts.poll_timeout_ms),
            },
        )),
        Mode::Block => Box::new(BlockTransport::new(
            device,
            BlockConfig {
                command: opts.command,
                ..Default::default()
            },
        )),
    };
    Ok(transport)
}

pub fn play(path: &Path, trace: &TraceBuffer, opts: &PlayOptions) -> Result<ReplaySummary> {
    let transport = open_transport(opts)?;
    tracing::info!(
        "playing {} ({:?}{})",
        path.display(),
        opts.mode,
        if opts.dry_run { ", dry run" } else { "" }
    );

    let mut session = ReplaySession::new(trace, transport, opts.config.clone())?;
    tracing::debug!("batch capacity {}", session.batch_capacity());
    let summary = session
        .run()
        .with_context(|| format!("playback of {} failed", path.display()))?;

    print_summary(&summary);
    Ok(summary)
}

fn print_summary(s: &ReplaySummary) {
    println!("Opcodes:        {}", s.opcodes);
    if s.unknown_opcodes > 0 {
        println!("Unknown:        {}", s.unknown_opcodes);
    }
    println!("Writes:         {} in {} batches", s.writes, s.batches);
    if s.failed_batches > 0 {
        println!("Failed batches: {}", s.failed_batches);
    }
    println!("Ticks:          {}", s.delay_ticks);
    println!("Loops:          {}", s.loops);
    println!(
        "Time:           {:.3} s (nominal {:.3} s, {} late)",
        s.elapsed.as_secs_f64(),
        s.nominal.as_secs_f64(),
        s.late_delays
    );
}

pub fn error_policy(continue_on_error: bool) -> TransportErrorPolicy {
    if continue_on_error {
        TransportErrorPolicy::Continue
    } else {
        TransportErrorPolicy::Abort
    }
}
