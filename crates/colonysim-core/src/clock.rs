//! Simulated clock for the settlement economy.
//!
//! The clock is the single source of truth for time inside the core. It
//! holds a tick counter, the simulated epoch, and the simulated duration of
//! one tick. Every timestamp the core writes (requests, conflicts, transfer
//! schedules) is derived from it, so a run never depends on wall-clock time.
//!
//! Time is computed as `epoch + tick * tick_duration` with checked
//! arithmetic; the tick number is the source of truth.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::RunConfig;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Simulated time would leave the representable range.
    #[error("simulated time overflow at tick {tick}")]
    TimeOverflow {
        /// Tick whose timestamp could not be computed.
        tick: u64,
    },

    /// Invalid time configuration (e.g. zero-length ticks).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Simulated clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimClock {
    /// Current tick number (0 before the first tick runs).
    tick: u64,
    /// Simulated time at tick 0.
    epoch: DateTime<Utc>,
    /// Simulated time covered by one tick.
    tick_duration: TimeDelta,
    /// Simulated time at the current tick, cached on advance.
    now: DateTime<Utc>,
}

impl SimClock {
    /// Create a clock from the run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the epoch is not RFC 3339 or
    /// the tick length is zero.
    pub fn new(config: &RunConfig) -> Result<Self, ClockError> {
        let epoch = DateTime::parse_from_rfc3339(&config.epoch)
            .map_err(|err| ClockError::InvalidConfig {
                reason: format!("epoch {:?} is not RFC 3339: {err}", config.epoch),
            })?
            .with_timezone(&Utc);
        Self::from_parts(0, epoch, TimeDelta::minutes(i64::from(config.tick_minutes)))
    }

    /// Create a clock from explicit parameters (useful for testing and
    /// state restoration).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `tick_duration` is not
    /// positive, or [`ClockError::TimeOverflow`] if `tick` lies outside the
    /// representable range.
    pub fn from_parts(
        tick: u64,
        epoch: DateTime<Utc>,
        tick_duration: TimeDelta,
    ) -> Result<Self, ClockError> {
        if tick_duration <= TimeDelta::zero() {
            return Err(ClockError::InvalidConfig {
                reason: "tick duration must be positive".to_owned(),
            });
        }
        let now = time_at(epoch, tick_duration, tick)?;
        Ok(Self {
            tick,
            epoch,
            tick_duration,
            now,
        })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`, or [`ClockError::TimeOverflow`] if the timestamp would.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        let next = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        self.now = time_at(self.epoch, self.tick_duration, next)?;
        self.tick = next;
        Ok(next)
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Return the simulated time at the current tick.
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Return the simulated epoch.
    pub const fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Return the simulated duration of one tick.
    pub const fn tick_duration(&self) -> TimeDelta {
        self.tick_duration
    }
}

/// Compute `epoch + tick * tick_duration` without overflow.
fn time_at(
    epoch: DateTime<Utc>,
    tick_duration: TimeDelta,
    tick: u64,
) -> Result<DateTime<Utc>, ClockError> {
    let ticks = i32::try_from(tick).map_err(|_| ClockError::TimeOverflow { tick })?;
    let offset = tick_duration
        .checked_mul(ticks)
        .ok_or(ClockError::TimeOverflow { tick })?;
    epoch
        .checked_add_signed(offset)
        .ok_or(ClockError::TimeOverflow { tick })
}
