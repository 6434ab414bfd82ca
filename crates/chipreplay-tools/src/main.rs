use std::path::PathBuf;

use anyhow::Result;
use chipreplay::replay::{DEFAULT_BATCH_CAPACITY, DEFAULT_REPORT_INTERVAL, ReplayConfig};
use chipreplay::trace::interpreter::DEFAULT_EXTENDED_DELAY_BIAS;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod i2c;
mod play;
mod trace;

use play::{Mode, PlayOptions};

/// chipreplay command line tools
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header, device and tag info for a trace (use '-' for stdin)
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the interpreted event stream with offsets
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Playthroughs to print when the trace loops
        #[arg(long, default_value_t = 1)]
        loops: u32,
    },
    /// Replay a trace to the sound chip
    Play {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Handshake)]
        mode: Mode,
        /// I2C bus device node
        #[arg(long, default_value = "/dev/i2c-1")]
        bus: PathBuf,
        /// Slave address of the expander or co-processor
        #[arg(long, default_value_t = i2c::DEFAULT_ADDRESS, value_parser = parse_u16)]
        address: u16,
        /// Command byte sent ahead of each block (block mode)
        #[arg(long, default_value_t = 0, value_parser = parse_u8)]
        command: u8,
        /// Writes per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_CAPACITY)]
        batch: usize,
        /// Ticks added to extended delay counts
        #[arg(long, default_value_t = DEFAULT_EXTENDED_DELAY_BIAS)]
        delay_bias: u32,
        /// Playthroughs before stopping (loops forever when omitted)
        #[arg(long)]
        loops: Option<u32>,
        /// Status polls per write before giving up (handshake mode)
        #[arg(long, default_value_t = 1000)]
        busy_retries: u32,
        /// Deadline for one busy poll, in milliseconds (handshake mode)
        #[arg(long, default_value_t = 10)]
        poll_timeout_ms: u64,
        /// Opcodes between throughput reports
        #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL)]
        report_interval: u64,
        /// Log failed batches and keep playing
        #[arg(long)]
        continue_on_error: bool,
        /// Replay with full timing but without touching hardware
        #[arg(long)]
        dry_run: bool,
    },
}

/// Accepts decimal or `0x`-prefixed hex.
fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let v = parse_u16(s)?;
    u8::try_from(v).map_err(|_| format!("{} does not fit in a byte", s))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => {
            let trace = trace::load_trace(&file)?;
            trace::info(&file, &trace)?;
        }
        Commands::Dump { file, loops } => {
            let trace = trace::load_trace(&file)?;
            trace::dump(&trace, loops)?;
        }
        Commands::Play {
            file,
            mode,
            bus,
            address,
            command,
            batch,
            delay_bias,
            loops,
            busy_retries,
            poll_timeout_ms,
            report_interval,
            continue_on_error,
            dry_run,
        } => {
            let trace = trace::load_trace(&file)?;
            let opts = PlayOptions {
                mode,
                bus,
                address,
                command,
                busy_retries,
                poll_timeout_ms,
                dry_run,
                config: ReplayConfig {
                    batch_capacity: batch,
                    extended_delay_bias: delay_bias,
                    report_interval,
                    loop_count: loops,
                    error_policy: play::error_policy(continue_on_error),
                },
            };
            play::play(&file, &trace, &opts)?;
        }
    }

    Ok(())
}
