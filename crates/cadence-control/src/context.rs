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

//! Device state observed by the adaptation controller.

use cadence_core::config::AdaptationConfig;
use cadence_core::event::TransitionCause;
use cadence_core::platform::{DeviceTelemetry, ThermalStatus};

/// The latest device telemetry plus the sticky forcing state derived from it.
///
/// Battery forcing engages below `battery_force_low_percent` and only clears
/// once the battery reports at least `battery_clear_percent`. A reading
/// without a battery value leaves the battery state unchanged. Thermal
/// forcing follows the latest thermal status.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    battery_force_low_percent: f32,
    battery_clear_percent: f32,
    thermal_force_low: ThermalStatus,
    latest: DeviceTelemetry,
    battery_forced: bool,
    thermal_forced: bool,
}

impl DeviceContext {
    /// Creates a context with no forcing active.
    pub fn new(config: &AdaptationConfig) -> Self {
        Self {
            battery_force_low_percent: config.battery_force_low_percent,
            battery_clear_percent: config.battery_clear_percent,
            thermal_force_low: config.thermal_force_low,
            latest: DeviceTelemetry::default(),
            battery_forced: false,
            thermal_forced: false,
        }
    }

    /// Applies a new reading.
    pub fn update(&mut self, telemetry: &DeviceTelemetry) {
        if let Some(percent) = telemetry.battery_percent {
            if percent < self.battery_force_low_percent {
                if !self.battery_forced {
                    log::warn!("Device: battery at {percent:.0}%, forcing low quality");
                }
                self.battery_forced = true;
            } else if percent >= self.battery_clear_percent && self.battery_forced {
                log::info!("Device: battery recovered to {percent:.0}%, releasing force");
                self.battery_forced = false;
            }
        }

        let thermal_forced = telemetry.thermal >= self.thermal_force_low;
        if thermal_forced != self.thermal_forced {
            log::info!(
                "Device: thermal {:?}, forcing {}",
                telemetry.thermal,
                if thermal_forced { "engaged" } else { "released" }
            );
        }
        self.thermal_forced = thermal_forced;

        self.latest = DeviceTelemetry {
            battery_percent: telemetry.battery_percent.or(self.latest.battery_percent),
            ..*telemetry
        };
    }

    /// The cause currently forcing `Low`, if any. Battery takes precedence.
    pub fn forcing_cause(&self) -> Option<TransitionCause> {
        if self.battery_forced {
            Some(TransitionCause::BatteryLow)
        } else if self.thermal_forced {
            Some(TransitionCause::ThermalCritical)
        } else {
            None
        }
    }

    /// The most recent reading, with the last known battery level.
    pub fn latest(&self) -> &DeviceTelemetry {
        &self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DeviceContext {
        DeviceContext::new(&AdaptationConfig::default())
    }

    #[test]
    fn test_default_has_no_forcing() {
        let ctx = context();
        assert_eq!(ctx.forcing_cause(), None);
        assert_eq!(ctx.latest().thermal, ThermalStatus::Cool);
    }

    #[test]
    fn test_battery_forcing_is_sticky_until_clear_threshold() {
        let mut ctx = context();
        ctx.update(&DeviceTelemetry::with_battery(8.0));
        assert_eq!(ctx.forcing_cause(), Some(TransitionCause::BatteryLow));

        // Above the forcing threshold but below the clear threshold.
        ctx.update(&DeviceTelemetry::with_battery(12.0));
        assert_eq!(ctx.forcing_cause(), Some(TransitionCause::BatteryLow));

        ctx.update(&DeviceTelemetry::with_battery(15.0));
        assert_eq!(ctx.forcing_cause(), None);
    }

    #[test]
    fn test_missing_battery_keeps_state() {
        let mut ctx = context();
        ctx.update(&DeviceTelemetry::with_battery(5.0));
        ctx.update(&DeviceTelemetry::default());
        assert_eq!(ctx.forcing_cause(), Some(TransitionCause::BatteryLow));
        assert_eq!(ctx.latest().battery_percent, Some(5.0));
    }

    #[test]
    fn test_thermal_forcing_follows_status() {
        let mut ctx = context();
        ctx.update(&DeviceTelemetry::with_thermal(ThermalStatus::Throttling));
        assert_eq!(ctx.forcing_cause(), None);
        ctx.update(&DeviceTelemetry::with_thermal(ThermalStatus::Critical));
        assert_eq!(ctx.forcing_cause(), Some(TransitionCause::ThermalCritical));
        ctx.update(&DeviceTelemetry::with_thermal(ThermalStatus::Warm));
        assert_eq!(ctx.forcing_cause(), None);
    }

    #[test]
    fn test_battery_takes_precedence() {
        let mut ctx = context();
        ctx.update(&DeviceTelemetry {
            battery_percent: Some(3.0),
            thermal: ThermalStatus::Critical,
            cpu_load: 0.5,
        });
        assert_eq!(ctx.forcing_cause(), Some(TransitionCause::BatteryLow));
        assert_eq!(ctx.latest().cpu_load, 0.5);
    }
}
