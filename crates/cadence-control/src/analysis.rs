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

//! Classification of finalized ticks.

use cadence_core::budget::TickTiming;

/// How a single tick fared against its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickHealth {
    /// Finished comfortably inside the budget. Counts towards promotion.
    Healthy,
    /// Finished in time, but without enough headroom to count as healthy.
    Neutral,
    /// Overran the budget. Counts towards demotion.
    Overrun,
}

impl TickHealth {
    /// Classifies a tick.
    ///
    /// A tick is healthy when it did not overrun and consumed less than
    /// `healthy_fraction` of its nominal budget.
    pub fn classify(timing: &TickTiming, healthy_fraction: f32) -> Self {
        if timing.overrun {
            TickHealth::Overrun
        } else if timing.consumed_ms < healthy_fraction * timing.nominal_ms {
            TickHealth::Healthy
        } else {
            TickHealth::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(consumed_ms: f32, overrun: bool) -> TickTiming {
        TickTiming {
            tick_id: 0,
            nominal_ms: 10.0,
            consumed_ms,
            overrun,
        }
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(TickHealth::classify(&timing(7.9, false), 0.8), TickHealth::Healthy);
        assert_eq!(TickHealth::classify(&timing(8.0, false), 0.8), TickHealth::Neutral);
        assert_eq!(TickHealth::classify(&timing(9.9, false), 0.8), TickHealth::Neutral);
        assert_eq!(TickHealth::classify(&timing(12.0, true), 0.8), TickHealth::Overrun);
    }
}
