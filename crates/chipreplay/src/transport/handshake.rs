//! Parallel-bus transport through an MCP23017-style I/O expander.
//!
//! Port A of the expander carries the chip's 8-bit data bus, port B its
//! control lines (`A0`, `/WR`, `/RD`, `/IC`). The control lines are active
//! low; `write_control` takes the logical (active-high) set and inverts
//! them on the way out.
//!
//! One register write is:
//!
//! 1. data bus to output, present the address byte
//! 2. pulse `/WR` with `A0` low
//! 3. raise `A0`, present the value byte, pulse `/WR`
//! 4. data bus back to input
//!
//! followed by a busy poll: read the status byte (`A0` high, pulse `/RD`)
//! until bit 7 clears. The poll blocks the caller and is bounded both by a
//! retry count and by a deadline.
use crate::replay::WriteBatch;
use crate::trace::WriteIntent;
use crate::transport::{Transport, TransportError};
use std::io;
use std::time::{Duration, Instant};

/// Expander register: port A direction.
pub const IODIRA: u8 = 0x00;
/// Expander register: port B direction.
pub const IODIRB: u8 = 0x01;
/// Expander register: port A value (data bus).
pub const GPIOA: u8 = 0x12;
/// Expander register: port B value (control lines).
pub const GPIOB: u8 = 0x13;

pub const CTRL_A0: u8 = 0x01;
pub const CTRL_WR: u8 = 0x02;
pub const CTRL_RD: u8 = 0x04;
pub const CTRL_RESET: u8 = 0x08;
/// Lines that are wired active-low.
const CTRL_ACTIVE_LOW: u8 = CTRL_WR | CTRL_RD | CTRL_RESET;

/// Status bit set while the chip is busy.
pub const STATUS_BUSY: u8 = 0x80;

/// Register-level access to the I/O expander.
pub trait ExpanderBus {
    fn write_reg8(&mut self, register: u8, value: u8) -> io::Result<()>;
    fn read_reg8(&mut self, register: u8) -> io::Result<u8>;
}

impl<B: ExpanderBus + ?Sized> ExpanderBus for &mut B {
    fn write_reg8(&mut self, register: u8, value: u8) -> io::Result<()> {
        (**self).write_reg8(register, value)
    }

    fn read_reg8(&mut self, register: u8) -> io::Result<u8> {
        (**self).read_reg8(register)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Status reads attempted before giving up.
    pub busy_retries: u32,
    /// Upper bound on the time spent polling one write.
    pub poll_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            busy_retries: 1000,
            poll_timeout: Duration::from_millis(10),
        }
    }
}

/// Result of a busy poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut { attempts: u32 },
}

#[derive(Debug)]
pub struct HandshakeTransport<B> {
    bus: B,
    config: HandshakeConfig,
}

impl<B: ExpanderBus> HandshakeTransport<B> {
    pub fn new(bus: B, config: HandshakeConfig) -> Self {
        Self { bus, config }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    fn set_data_direction(&mut self, output: bool) -> Result<(), TransportError> {
        let dir = if output { 0x00 } else { 0xFF };
        self.bus
            .write_reg8(IODIRA, dir)
            .map_err(TransportError::io("set data bus direction"))
    }

    fn write_data(&mut self, data: u8) -> Result<(), TransportError> {
        self.bus
            .write_reg8(GPIOA, data)
            .map_err(TransportError::io("write data bus"))
    }

    fn write_control(&mut self, lines: u8) -> Result<(), TransportError> {
        self.bus
            .write_reg8(GPIOB, lines ^ CTRL_ACTIVE_LOW)
            .map_err(TransportError::io("write control bus"))
    }

    /// Perform the strobe sequence for one register write.
    pub fn write_register(&mut self, intent: WriteIntent) -> Result<(), TransportError> {
        self.set_data_direction(true)?;
        self.write_data(intent.address)?;
        self.write_control(CTRL_WR)?;
        self.write_control(0)?;
        self.write_control(CTRL_A0)?;
        self.write_data(intent.value)?;
        self.write_control(CTRL_A0 | CTRL_WR)?;
        self.write_control(CTRL_A0)?;
        self.set_data_direction(false)
    }

    /// Read the chip's status byte.
    pub fn read_status(&mut self) -> Result<u8, TransportError> {
        self.write_control(CTRL_A0)?;
        self.write_control(CTRL_A0 | CTRL_RD)?;
        let status = self
            .bus
            .read_reg8(GPIOA)
            .map_err(TransportError::io("read status"))?;
        self.write_control(0)?;
        Ok(status)
    }

    /// Poll the busy flag until it clears or the retry/deadline bound is hit.
    pub fn poll_ready(&mut self) -> Result<PollOutcome, TransportError> {
        let deadline = Instant::now() + self.config.poll_timeout;
        let retries = self.config.busy_retries.max(1);
        for attempt in 1..=retries {
            if self.read_status()? & STATUS_BUSY == 0 {
                return Ok(PollOutcome::Ready);
            }
            tracing::trace!("busy (poll {})", attempt);
            if Instant::now() >= deadline {
                return Ok(PollOutcome::TimedOut { attempts: attempt });
            }
        }
        Ok(PollOutcome::TimedOut { attempts: retries })
    }
}

impl<B: ExpanderBus> Transport for HandshakeTransport<B> {
    /// Port A to input, port B to output, then pulse reset.
    fn open(&mut self) -> Result<(), TransportError> {
        self.set_data_direction(false)?;
        self.bus
            .write_reg8(IODIRB, 0x00)
            .map_err(TransportError::io("set control bus direction"))?;
        self.write_control(CTRL_RESET)?;
        self.write_control(0)
    }

    fn send(&mut self, batch: WriteBatch) -> Result<(), TransportError> {
        for intent in batch {
            self.write_register(intent)?;
            if let PollOutcome::TimedOut { attempts } = self.poll_ready()? {
                return Err(TransportError::Timeout {
                    address: intent.address,
                    value: intent.value,
                    attempts,
                });
            }
        }
        Ok(())
    }
}
