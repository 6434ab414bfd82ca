//! Tick rate conversion and drift-corrected pacing.
//!
//! `TimingEngine` turns nominal delays (in base ticks) into wall-clock waits.
//! Each delay measures the time elapsed since the anchor and only sleeps for
//! what is left of the target duration, so time spent in transport I/O or
//! lost to scheduling jitter is absorbed by the next wait instead of adding
//! up across the session.
//!
//! After a completed wait the anchor advances by exactly the target, which
//! also absorbs sleep overshoot. When the elapsed time already exceeds the
//! target no wait happens and the anchor jumps to "now": the lag is dropped
//! rather than recovered with a burst of zero-length waits.
use std::time::{Duration, Instant};
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimingError {
    /// The tick rate has a zero denominator.
    #[error("tick rate {numerator}/{denominator} is undefined")]
    UndefinedRate { numerator: u32, denominator: u32 },
    /// The requested delay does not fit in a `Duration`.
    #[error("delay of {ticks} ticks overflows")]
    Overflow { ticks: u32 },
}

/// Duration of one base tick, as `numerator / denominator` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl TickRate {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Wall-clock length of `ticks` base ticks.
    pub fn duration_of(&self, ticks: u32) -> Result<Duration, TimingError> {
        if self.denominator == 0 {
            return Err(TimingError::UndefinedRate {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        let nanos = u128::from(ticks) * u128::from(self.numerator) * NANOS_PER_SEC
            / u128::from(self.denominator);
        u64::try_from(nanos)
            .map(Duration::from_nanos)
            .map_err(|_| TimingError::Overflow { ticks })
    }
}

/// Source of monotonic time and blocking sleeps.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

/// `Clock` backed by `Instant::now` and `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Anchor timestamp plus the nominal time played so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    pub anchor: Instant,
    pub nominal: Duration,
}

#[derive(Debug)]
pub struct TimingEngine<C: Clock> {
    rate: TickRate,
    clock: C,
    playback: PlaybackClock,
    /// Delays that found the elapsed time already past their target
    late_delays: u64,
}

impl<C: Clock> TimingEngine<C> {
    /// Create an engine anchored at the clock's current time.
    ///
    /// Fails with `TimingError::UndefinedRate` when the rate cannot produce
    /// a duration.
    pub fn new(rate: TickRate, clock: C) -> Result<Self, TimingError> {
        rate.duration_of(1)?;
        let anchor = clock.now();
        Ok(Self {
            rate,
            clock,
            playback: PlaybackClock {
                anchor,
                nominal: Duration::ZERO,
            },
            late_delays: 0,
        })
    }

    /// Re-anchor at the current time, e.g. right before the first opcode.
    pub fn restart(&mut self) {
        self.playback.anchor = self.clock.now();
    }

    pub fn rate(&self) -> TickRate {
        self.rate
    }

    pub fn playback_clock(&self) -> PlaybackClock {
        self.playback
    }

    pub fn late_delays(&self) -> u64 {
        self.late_delays
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Wait out `ticks` base ticks, measured from the anchor.
    ///
    /// Returns the time actually slept (zero when running late).
    pub fn delay(&mut self, ticks: u32) -> Result<Duration, TimingError> {
        let target = self.rate.duration_of(ticks)?;
        self.playback.nominal = self.playback.nominal.saturating_add(target);

        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.playback.anchor);
        if elapsed < target {
            let wait = target - elapsed;
            self.clock.sleep(wait);
            self.playback.anchor += target;
            Ok(wait)
        } else {
            self.late_delays += 1;
            tracing::trace!("running late by {:?}", elapsed - target);
            self.playback.anchor = now;
            Ok(Duration::ZERO)
        }
    }
}
