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

//! sysinfo-based implementation of the HardwareMonitor trait.

use cadence_core::platform::{HardwareMonitor, ThermalStatus};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Components, System};

/// Temperature (°C) above which the device is considered warm.
pub const WARM_CELSIUS: f32 = 60.0;
/// Temperature (°C) above which the device is considered throttling.
pub const THROTTLING_CELSIUS: f32 = 80.0;
/// Temperature (°C) above which the device is considered critical.
pub const CRITICAL_CELSIUS: f32 = 90.0;

/// A hardware monitor that uses the `sysinfo` crate.
///
/// Battery state is not exposed by `sysinfo`, so [`battery_percent`] is
/// always `None`; hosts with a battery push readings themselves.
///
/// [`battery_percent`]: HardwareMonitor::battery_percent
#[derive(Debug)]
pub struct SysinfoMonitor {
    system: Mutex<System>,
}

impl SysinfoMonitor {
    /// Creates a new SysinfoMonitor.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Refreshes the CPU usage counters.
    ///
    /// CPU load is a delta between two refreshes, so the first reading after
    /// construction is meaningless until this has been called once more.
    pub fn refresh(&self) {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_all();
    }

    /// Hottest CPU-labelled component, if the host reports any.
    pub fn max_cpu_temperature(&self) -> Option<f32> {
        let components = Components::new_with_refreshed_list();
        components
            .iter()
            .filter(|component| {
                let label = component.label().to_lowercase();
                label.contains("cpu") || label.contains("core") || label.contains("package")
            })
            .filter_map(|component| component.temperature())
            .filter(|temp| temp.is_finite() && *temp > 0.0)
            .reduce(f32::max)
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a temperature to a [`ThermalStatus`]. Unknown temperatures map to
/// `Cool`.
pub fn classify_temperature(celsius: Option<f32>) -> ThermalStatus {
    match celsius {
        Some(t) if t > CRITICAL_CELSIUS => ThermalStatus::Critical,
        Some(t) if t > THROTTLING_CELSIUS => ThermalStatus::Throttling,
        Some(t) if t > WARM_CELSIUS => ThermalStatus::Warm,
        _ => ThermalStatus::Cool,
    }
}

impl HardwareMonitor for SysinfoMonitor {
    fn thermal_status(&self) -> ThermalStatus {
        classify_temperature(self.max_cpu_temperature())
    }

    fn battery_percent(&self) -> Option<f32> {
        None
    }

    fn cpu_load(&self) -> f32 {
        let system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        (system.global_cpu_usage() / 100.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_temperature() {
        assert_eq!(classify_temperature(None), ThermalStatus::Cool);
        assert_eq!(classify_temperature(Some(45.0)), ThermalStatus::Cool);
        assert_eq!(classify_temperature(Some(60.0)), ThermalStatus::Cool);
        assert_eq!(classify_temperature(Some(70.0)), ThermalStatus::Warm);
        assert_eq!(classify_temperature(Some(85.0)), ThermalStatus::Throttling);
        assert_eq!(classify_temperature(Some(95.0)), ThermalStatus::Critical);
    }

    #[test]
    fn test_sample_is_in_range() {
        let monitor = SysinfoMonitor::new();
        monitor.refresh();
        let sample = monitor.sample();
        assert!((0.0..=1.0).contains(&sample.cpu_load));
        assert_eq!(sample.battery_percent, None);
    }
}
