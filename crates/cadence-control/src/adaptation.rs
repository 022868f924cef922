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

//! The closed-loop quality controller.
//!
//! Decisions are driven only by measured tick timings and device telemetry.
//! Nothing here predicts the cost of upcoming work.
//!
//! - `demote_after_overruns` consecutive overruns step the level down once.
//! - `promote_after_healthy_ticks` consecutive healthy ticks step it up once.
//!   Validation guarantees this is strictly more than the demotion count, so
//!   recovery is always slower than degradation.
//! - A tick that is neither healthy nor an overrun resets both streaks.
//! - Battery or thermal forcing jumps straight to `Low` and blocks promotion
//!   until the forcing condition clears.

use crate::analysis::TickHealth;
use crate::context::DeviceContext;
use crate::metrics::TickStatistics;
use cadence_core::budget::TickTiming;
use cadence_core::config::AdaptationConfig;
use cadence_core::event::{QualityTransition, TransitionCause};
use cadence_core::platform::DeviceTelemetry;
use cadence_core::quality::QualityLevel;

/// Hysteresis state machine over [`QualityLevel`].
#[derive(Debug, Clone)]
pub struct AdaptationController {
    promote_after: u32,
    demote_after: u32,
    healthy_fraction: f32,
    level: QualityLevel,
    healthy_streak: u32,
    overrun_streak: u32,
    device: DeviceContext,
    stats: TickStatistics,
}

impl AdaptationController {
    /// Creates a controller at `config.initial_quality`.
    pub fn new(config: &AdaptationConfig) -> Self {
        Self {
            promote_after: config.promote_after_healthy_ticks,
            demote_after: config.demote_after_overruns,
            healthy_fraction: config.healthy_budget_fraction,
            level: config.initial_quality,
            healthy_streak: 0,
            overrun_streak: 0,
            device: DeviceContext::new(config),
            stats: TickStatistics::new(config.stats_window),
        }
    }

    /// The current level.
    pub fn level(&self) -> QualityLevel {
        self.level
    }

    /// Rolling tick statistics.
    pub fn statistics(&self) -> &TickStatistics {
        &self.stats
    }

    /// Device state and forcing.
    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    /// Consecutive healthy ticks observed.
    pub fn healthy_streak(&self) -> u32 {
        self.healthy_streak
    }

    /// Consecutive overrunning ticks observed.
    pub fn overrun_streak(&self) -> u32 {
        self.overrun_streak
    }

    /// Feeds one finalized tick, plus any device reading received during it,
    /// and returns the resulting transition, if any.
    ///
    /// The caller applies the new level from the next tick on.
    pub fn observe(
        &mut self,
        timing: &TickTiming,
        device: Option<&DeviceTelemetry>,
    ) -> Option<QualityTransition> {
        self.stats.record(timing);
        if let Some(reading) = device {
            self.device.update(reading);
        }

        if let Some(cause) = self.device.forcing_cause() {
            self.healthy_streak = 0;
            self.overrun_streak = 0;
            if self.level == QualityLevel::Low {
                return None;
            }
            return Some(self.transition(timing.tick_id, QualityLevel::Low, cause));
        }

        match TickHealth::classify(timing, self.healthy_fraction) {
            TickHealth::Healthy => {
                self.healthy_streak = self.healthy_streak.saturating_add(1);
                self.overrun_streak = 0;
            }
            TickHealth::Overrun => {
                self.overrun_streak = self.overrun_streak.saturating_add(1);
                self.healthy_streak = 0;
                log::debug!(
                    "Adaptation: tick {} overran ({:.2} ms of {:.2} ms), streak {}",
                    timing.tick_id,
                    timing.consumed_ms,
                    timing.nominal_ms,
                    self.overrun_streak
                );
            }
            TickHealth::Neutral => {
                self.healthy_streak = 0;
                self.overrun_streak = 0;
            }
        }

        if self.overrun_streak >= self.demote_after {
            self.overrun_streak = 0;
            if let Some(lower) = self.level.demoted() {
                return Some(self.transition(
                    timing.tick_id,
                    lower,
                    TransitionCause::OverrunThreshold,
                ));
            }
        } else if self.healthy_streak >= self.promote_after {
            self.healthy_streak = 0;
            if let Some(higher) = self.level.promoted() {
                return Some(self.transition(
                    timing.tick_id,
                    higher,
                    TransitionCause::SustainedHeadroom,
                ));
            }
        }

        None
    }

    fn transition(&mut self, tick_id: u64, to: QualityLevel, cause: TransitionCause) -> QualityTransition {
        let transition = QualityTransition {
            tick_id,
            from: self.level,
            to,
            cause,
        };
        self.level = to;
        self.healthy_streak = 0;
        self.overrun_streak = 0;
        log::info!(
            "Adaptation: quality {} -> {} at tick {} ({})",
            transition.from,
            transition.to,
            tick_id,
            cause
        );
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOMINAL: f32 = 16.67;

    fn healthy(tick_id: u64) -> TickTiming {
        TickTiming {
            tick_id,
            nominal_ms: NOMINAL,
            consumed_ms: 4.0,
            overrun: false,
        }
    }

    fn overrun(tick_id: u64) -> TickTiming {
        TickTiming {
            tick_id,
            nominal_ms: NOMINAL,
            consumed_ms: 25.0,
            overrun: true,
        }
    }

    fn neutral(tick_id: u64) -> TickTiming {
        TickTiming {
            tick_id,
            nominal_ms: NOMINAL,
            consumed_ms: 15.0,
            overrun: false,
        }
    }

    fn controller() -> AdaptationController {
        AdaptationController::new(&AdaptationConfig::default())
    }

    #[test]
    fn test_demotes_after_threshold_overruns() {
        let mut ctrl = controller();
        assert_eq!(ctrl.observe(&overrun(0), None), None);
        assert_eq!(ctrl.observe(&overrun(1), None), None);
        let transition = ctrl.observe(&overrun(2), None).unwrap();
        assert_eq!(transition.from, QualityLevel::High);
        assert_eq!(transition.to, QualityLevel::Medium);
        assert_eq!(transition.cause, TransitionCause::OverrunThreshold);
        assert_eq!(ctrl.level(), QualityLevel::Medium);
    }

    #[test]
    fn test_interrupted_overruns_do_not_demote() {
        let mut ctrl = controller();
        ctrl.observe(&overrun(0), None);
        ctrl.observe(&overrun(1), None);
        ctrl.observe(&neutral(2), None);
        assert_eq!(ctrl.observe(&overrun(3), None), None);
        assert_eq!(ctrl.level(), QualityLevel::High);
    }

    #[test]
    fn test_promotion_needs_strictly_more_ticks_than_demotion() {
        let config = AdaptationConfig {
            initial_quality: QualityLevel::Low,
            ..AdaptationConfig::default()
        };
        let mut ctrl = AdaptationController::new(&config);
        assert!(config.promote_after_healthy_ticks > config.demote_after_overruns);

        for tick in 0..59 {
            assert_eq!(ctrl.observe(&healthy(tick), None), None, "tick {tick}");
        }
        let transition = ctrl.observe(&healthy(59), None).unwrap();
        assert_eq!(transition.to, QualityLevel::Medium);
        assert_eq!(transition.cause, TransitionCause::SustainedHeadroom);

        // Steps one level at a time.
        for tick in 60..119 {
            assert_eq!(ctrl.observe(&healthy(tick), None), None);
        }
        assert_eq!(
            ctrl.observe(&healthy(119), None).map(|t| t.to),
            Some(QualityLevel::High)
        );
        for tick in 120..300 {
            assert_eq!(ctrl.observe(&healthy(tick), None), None);
        }
    }

    #[test]
    fn test_neutral_tick_resets_healthy_streak() {
        let config = AdaptationConfig {
            initial_quality: QualityLevel::Medium,
            promote_after_healthy_ticks: 5,
            ..AdaptationConfig::default()
        };
        let mut ctrl = AdaptationController::new(&config);
        for tick in 0..4 {
            ctrl.observe(&healthy(tick), None);
        }
        ctrl.observe(&neutral(4), None);
        assert_eq!(ctrl.healthy_streak(), 0);
        for tick in 5..9 {
            assert_eq!(ctrl.observe(&healthy(tick), None), None);
        }
        assert!(ctrl.observe(&healthy(9), None).is_some());
    }

    #[test]
    fn test_low_battery_forces_low_immediately() {
        let mut ctrl = controller();
        for tick in 0..50 {
            ctrl.observe(&healthy(tick), None);
        }
        let transition = ctrl
            .observe(&healthy(50), Some(&DeviceTelemetry::with_battery(8.0)))
            .unwrap();
        assert_eq!(transition.from, QualityLevel::High);
        assert_eq!(transition.to, QualityLevel::Low);
        assert_eq!(transition.cause, TransitionCause::BatteryLow);

        // Sticky while the battery stays below the clear threshold.
        for tick in 51..200 {
            let reading = DeviceTelemetry::with_battery(12.0);
            assert_eq!(ctrl.observe(&healthy(tick), Some(&reading)), None);
            assert_eq!(ctrl.level(), QualityLevel::Low);
        }

        // Once cleared, recovery follows the normal hysteresis.
        ctrl.observe(&healthy(200), Some(&DeviceTelemetry::with_battery(40.0)));
        let mut promoted_at = None;
        for tick in 201..400 {
            if let Some(t) = ctrl.observe(&healthy(tick), None) {
                promoted_at = Some((tick, t.to));
                break;
            }
        }
        assert_eq!(promoted_at, Some((259, QualityLevel::Medium)));
    }

    #[test]
    fn test_thermal_forcing() {
        let mut ctrl = controller();
        let hot = DeviceTelemetry::with_thermal(cadence_core::platform::ThermalStatus::Critical);
        let transition = ctrl.observe(&healthy(0), Some(&hot)).unwrap();
        assert_eq!(transition.cause, TransitionCause::ThermalCritical);
        assert_eq!(ctrl.observe(&healthy(1), Some(&hot)), None);
    }

    #[test]
    fn test_no_demotion_below_low() {
        let config = AdaptationConfig {
            initial_quality: QualityLevel::Low,
            ..AdaptationConfig::default()
        };
        let mut ctrl = AdaptationController::new(&config);
        for tick in 0..20 {
            assert_eq!(ctrl.observe(&overrun(tick), None), None);
        }
        assert_eq!(ctrl.statistics().overrun_count(), 20);
    }
}
