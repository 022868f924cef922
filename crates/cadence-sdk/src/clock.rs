// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The frame clock: fixed-interval ticks on an absolute schedule.

use cadence_core::config::ConfigError;
use cadence_core::{Clock, StartupError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One firing of the [`FrameClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Contiguous tick counter, starting at zero.
    pub tick_id: u64,
    /// The slot this tick was scheduled for.
    pub scheduled: Instant,
    /// When the clock actually observed the slot.
    pub fired: Instant,
    /// Slots skipped immediately before this tick because the loop fell
    /// more than one interval behind.
    pub skipped: u64,
}

impl Tick {
    /// How late the tick fired relative to its slot.
    pub fn lateness(&self) -> Duration {
        self.fired.saturating_duration_since(self.scheduled)
    }
}

/// Fires ticks at a fixed nominal interval.
///
/// Deadlines are computed from an absolute schedule (`anchor + n ×
/// interval`), so per-tick jitter never accumulates into drift. When the
/// caller falls more than one full interval behind, the missed slots are
/// skipped and counted instead of being fired back-to-back.
pub struct FrameClock {
    clock: Arc<dyn Clock>,
    interval: Duration,
    next_deadline: Instant,
    next_tick_id: u64,
    skipped_total: u64,
}

impl FrameClock {
    /// Creates a clock whose first tick is due immediately.
    ///
    /// Fails if the host clock does not pass its check or the interval is
    /// zero.
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Result<Self, StartupError> {
        clock.check()?;
        if interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval.into());
        }
        let next_deadline = clock.now();
        Ok(Self {
            clock,
            interval,
            next_deadline,
            next_tick_id: 0,
            skipped_total: 0,
        })
    }

    /// The nominal interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next tick is due.
    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Time until the next tick is due, zero if it already is.
    pub fn time_until_next(&self) -> Duration {
        self.next_deadline
            .saturating_duration_since(self.clock.now())
    }

    /// Slots skipped since the clock was created.
    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    /// Fires the next tick if it is due, without blocking.
    pub fn poll(&mut self) -> Option<Tick> {
        let now = self.clock.now();
        if now < self.next_deadline {
            return None;
        }

        let behind = now.duration_since(self.next_deadline).as_nanos() / self.interval.as_nanos();
        let skipped = u64::try_from(behind).unwrap_or(u64::MAX);
        if skipped > 0 {
            let jump = u32::try_from(skipped).unwrap_or(u32::MAX);
            self.next_deadline += self.interval.saturating_mul(jump);
            self.skipped_total = self.skipped_total.saturating_add(skipped);
            log::debug!(
                "FrameClock: {skipped} slot(s) skipped before tick {}",
                self.next_tick_id
            );
        }

        let tick = Tick {
            tick_id: self.next_tick_id,
            scheduled: self.next_deadline,
            fired: now,
            skipped,
        };
        self.next_deadline += self.interval;
        self.next_tick_id += 1;
        Some(tick)
    }

    /// Blocks until the next tick is due and fires it.
    pub fn wait(&mut self) -> Tick {
        loop {
            let pending = self.time_until_next();
            if !pending.is_zero() {
                std::thread::sleep(pending);
            }
            if let Some(tick) = self.poll() {
                return tick;
            }
        }
    }
}

/// A host clock advanced by hand.
///
/// Used to drive sessions deterministically in simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_unix_ms: u64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock reading `base_unix_ms` on the wall clock.
    pub fn new(base_unix_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            base_unix_ms,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves time forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn unix_millis(&self) -> Option<u64> {
        Some(self.base_unix_ms + self.offset().as_millis() as u64)
    }
}
