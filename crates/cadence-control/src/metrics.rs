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

//! Rolling tick timing statistics.

use cadence_core::budget::TickTiming;
use cadence_core::utils::RingBuffer;

/// Aggregates finalized tick timings over a rolling window.
///
/// The average and p95 cover the window; the overrun and tick counts cover
/// the whole session.
#[derive(Debug, Clone)]
pub struct TickStatistics {
    consumed_ms: RingBuffer<f32>,
    overrun_count: u64,
    tick_count: u64,
    last: Option<TickTiming>,
}

impl TickStatistics {
    /// Creates statistics over the last `window` ticks.
    pub fn new(window: usize) -> Self {
        Self {
            consumed_ms: RingBuffer::new(window),
            overrun_count: 0,
            tick_count: 0,
            last: None,
        }
    }

    /// Adds one finalized tick.
    pub fn record(&mut self, timing: &TickTiming) {
        self.consumed_ms.push(timing.consumed_ms);
        self.tick_count += 1;
        if timing.overrun {
            self.overrun_count += 1;
        }
        self.last = Some(*timing);
    }

    /// Mean tick duration over the window.
    pub fn average_ms(&self) -> f32 {
        self.consumed_ms.average()
    }

    /// 95th percentile tick duration over the window.
    pub fn p95_ms(&self) -> f32 {
        self.consumed_ms.percentile(0.95)
    }

    /// Longest tick in the window.
    pub fn max_ms(&self) -> f32 {
        self.consumed_ms.max()
    }

    /// Variance of tick durations over the window. High values indicate
    /// stutter even when the mean is comfortable.
    pub fn variance(&self) -> f32 {
        self.consumed_ms.variance()
    }

    /// Overrunning ticks since the session started.
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count
    }

    /// Ticks recorded since the session started.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The most recent timing.
    pub fn last(&self) -> Option<&TickTiming> {
        self.last.as_ref()
    }
}
