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

//! Provides abstractions over host-specific functionality.
//!
//! This module contains the traits and types through which the pipeline
//! observes the machine it runs on: the time source that drives the frame
//! clock, and the physical device state (thermal, battery, CPU load) that the
//! adaptation controller may use to force degradation.

pub mod clock;

pub use clock::{Clock, SystemClock};

use serde::{Deserialize, Serialize};

/// Represents the thermal state of the device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ThermalStatus {
    /// Device is running cool.
    #[default]
    Cool,
    /// Device is warming up but within normal bounds.
    Warm,
    /// Device is actively throttling performance to shed heat.
    Throttling,
    /// Device is at critical temperature, emergency measures required.
    Critical,
}

/// A snapshot of the physical device state, supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    /// Battery charge in percent (`0..=100`). `None` on mains-only hardware
    /// or when unknown.
    pub battery_percent: Option<f32>,
    /// Current thermal status.
    pub thermal: ThermalStatus,
    /// Overall CPU load (0.0 to 1.0).
    pub cpu_load: f32,
}

impl DeviceTelemetry {
    /// Telemetry reporting only a battery level.
    pub fn with_battery(percent: f32) -> Self {
        Self {
            battery_percent: Some(percent),
            ..Self::default()
        }
    }

    /// Telemetry reporting only a thermal state.
    pub fn with_thermal(thermal: ThermalStatus) -> Self {
        Self {
            thermal,
            ..Self::default()
        }
    }
}

/// Trait for observing the physical state of the host platform.
pub trait HardwareMonitor: Send + Sync {
    /// Returns the current thermal status.
    fn thermal_status(&self) -> ThermalStatus;
    /// Returns the current battery charge in percent, if the host has one.
    fn battery_percent(&self) -> Option<f32>;
    /// Returns the current overall CPU load (0.0 to 1.0).
    fn cpu_load(&self) -> f32;

    /// Samples every reading at once.
    fn sample(&self) -> DeviceTelemetry {
        DeviceTelemetry {
            battery_percent: self.battery_percent(),
            thermal: self.thermal_status(),
            cpu_load: self.cpu_load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMonitor;

    impl HardwareMonitor for FixedMonitor {
        fn thermal_status(&self) -> ThermalStatus {
            ThermalStatus::Warm
        }
        fn battery_percent(&self) -> Option<f32> {
            Some(42.0)
        }
        fn cpu_load(&self) -> f32 {
            0.25
        }
    }

    #[test]
    fn test_thermal_ordering() {
        assert!(ThermalStatus::Cool < ThermalStatus::Warm);
        assert!(ThermalStatus::Throttling < ThermalStatus::Critical);
    }

    #[test]
    fn test_default_sample_combines_readings() {
        let sample = FixedMonitor.sample();
        assert_eq!(sample.thermal, ThermalStatus::Warm);
        assert_eq!(sample.battery_percent, Some(42.0));
        assert_eq!(sample.cpu_load, 0.25);
    }

    #[test]
    fn test_telemetry_constructors() {
        assert_eq!(DeviceTelemetry::with_battery(8.0).battery_percent, Some(8.0));
        assert_eq!(
            DeviceTelemetry::with_thermal(ThermalStatus::Critical).thermal,
            ThermalStatus::Critical
        );
    }
}
