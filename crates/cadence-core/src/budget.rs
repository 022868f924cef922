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

//! Per-tick time accounting.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Nominal tick interval for a 60 Hz cadence, in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: f32 = 16.67;

/// The running time budget of a single tick.
///
/// Created when the tick starts and finalized exactly once when it ends.
/// While running, [`remaining`](Self::remaining) tells each pipeline stage how
/// much of the deadline is left.
#[derive(Debug, Clone)]
pub struct TickBudget {
    tick_id: u64,
    started: Instant,
    nominal: Duration,
    consumed: Option<Duration>,
}

impl TickBudget {
    /// Starts a budget now.
    pub fn begin(tick_id: u64, nominal: Duration) -> Self {
        Self::begin_at(tick_id, nominal, Instant::now())
    }

    /// Starts a budget at an explicit instant (the tick's actual start).
    pub fn begin_at(tick_id: u64, nominal: Duration, started: Instant) -> Self {
        Self {
            tick_id,
            started,
            nominal,
            consumed: None,
        }
    }

    /// The tick this budget belongs to.
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// When the tick started.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// The nominal budget.
    pub fn nominal(&self) -> Duration {
        self.nominal
    }

    /// Time spent so far, or the final consumption once finalized.
    pub fn elapsed(&self) -> Duration {
        self.consumed.unwrap_or_else(|| self.started.elapsed())
    }

    /// Time left before the deadline. Zero once the deadline has passed.
    pub fn remaining(&self) -> Duration {
        self.nominal.saturating_sub(self.elapsed())
    }

    /// Time left after holding back `reserve` for the end-of-tick stages.
    pub fn remaining_with_reserve(&self, reserve: Duration) -> Duration {
        self.remaining().saturating_sub(reserve)
    }

    /// Returns `true` once the deadline has been exceeded.
    pub fn is_overrun(&self) -> bool {
        self.elapsed() > self.nominal
    }

    /// Freezes the consumed time and returns the tick's timing record.
    ///
    /// Calling it again returns the same record.
    pub fn finalize(&mut self) -> TickTiming {
        let consumed = *self.consumed.get_or_insert_with(|| self.started.elapsed());
        TickTiming {
            tick_id: self.tick_id,
            nominal_ms: duration_ms(self.nominal),
            consumed_ms: duration_ms(consumed),
            overrun: consumed > self.nominal,
        }
    }
}

/// The finalized timing of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickTiming {
    /// The tick.
    pub tick_id: u64,
    /// Nominal budget in milliseconds.
    pub nominal_ms: f32,
    /// Time actually consumed in milliseconds.
    pub consumed_ms: f32,
    /// `true` if `consumed_ms > nominal_ms`.
    pub overrun: bool,
}

impl TickTiming {
    /// Consumed time as a fraction of the nominal budget.
    pub fn utilization(&self) -> f32 {
        if self.nominal_ms <= 0.0 {
            return f32::INFINITY;
        }
        self.consumed_ms / self.nominal_ms
    }
}

/// Converts a duration to fractional milliseconds.
pub fn duration_ms(duration: Duration) -> f32 {
    duration.as_secs_f32() * 1000.0
}

/// Converts fractional milliseconds to a duration.
///
/// Negatives and NaN clamp to zero; values too large to represent saturate
/// at [`Duration::MAX`].
pub fn ms_duration(ms: f32) -> Duration {
    Duration::try_from_secs_f32(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}
