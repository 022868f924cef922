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

//! Session configuration.
//!
//! Read once at startup and never hot-reloaded. Every threshold in the
//! pipeline is a tunable default here rather than a constant in code. All
//! sections are `#[serde(default)]`, so a configuration file only needs the
//! values it overrides.

use crate::budget::{ms_duration, DEFAULT_TICK_INTERVAL_MS};
use crate::platform::ThermalStatus;
use crate::quality::QualityLevel;
use crate::stream::{StreamConfig, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// A configuration validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric setting is NaN or infinite.
    #[error("'{field}' must be finite, got {value}")]
    NonFinite {
        /// Dotted path of the setting.
        field: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// `clock.tick_interval_ms` must be positive.
    #[error("tick interval must be positive")]
    ZeroTickInterval,
    /// Energy weights must be non-negative and not both zero.
    #[error("energy weights must be non-negative with a positive sum")]
    InvalidEnergyWeights,
    /// `energy.stall_decay` must lie strictly between 0 and 1.
    #[error("stall decay {0} must be in (0, 1)")]
    InvalidStallDecay(f32),
    /// `energy.max_entropy` must be positive.
    #[error("max entropy must be positive")]
    InvalidMaxEntropy,
    /// A rolling window was configured with zero capacity.
    #[error("window '{0}' must hold at least {1} entries")]
    WindowTooSmall(&'static str, usize),
    /// Promotion must require strictly more ticks than demotion.
    #[error(
        "promotion needs {promote} healthy ticks but demotion needs {demote}; promotion must be strictly slower"
    )]
    SymmetricHysteresis {
        /// Configured healthy ticks before promotion.
        promote: u32,
        /// Configured overruns before demotion.
        demote: u32,
    },
    /// `adaptation.demote_after_overruns` must be at least 1.
    #[error("demotion threshold must be at least 1")]
    ZeroDemotionThreshold,
    /// `adaptation.healthy_budget_fraction` must be in (0, 1].
    #[error("healthy budget fraction {0} must be in (0, 1]")]
    InvalidHealthyFraction(f32),
    /// The battery clear threshold must not be below the forcing threshold.
    #[error("battery clear threshold {clear}% is below the forcing threshold {force}%")]
    BatteryThresholds {
        /// Forcing threshold.
        force: f32,
        /// Clear threshold.
        clear: f32,
    },
    /// Extension budgets must be positive.
    #[error("default extension budget must be positive")]
    InvalidExtensionBudget,
    /// `extensions.emit_reserve_ms` must not be negative.
    #[error("emit reserve {0} ms must not be negative")]
    NegativeEmitReserve(f32),
    /// The overrun ceiling must be at least 1.
    #[error("extension overrun ceiling must be at least 1")]
    ZeroOverrunCeiling,
    /// A bounded channel or queue was configured with zero capacity.
    #[error("capacity of '{0}' must be at least 1")]
    ZeroCapacity(&'static str),
    /// A stream weight is negative or not finite.
    #[error("stream '{0}' has an invalid weight")]
    InvalidStreamWeight(StreamId),
    /// The same stream id appears twice.
    #[error("stream '{0}' is configured more than once")]
    DuplicateStream(StreamId),
}

/// Frame clock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Nominal tick interval in milliseconds.
    pub tick_interval_ms: f32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl ClockConfig {
    /// The tick interval as a duration.
    pub fn interval(&self) -> Duration {
        ms_duration(self.tick_interval_ms)
    }
}

/// Token energy calculator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Weight of the relative-speed term.
    pub speed_weight: f32,
    /// Weight of the entropy-derived certainty term.
    pub certainty_weight: f32,
    /// Multiplier applied to the previous value on every stalled tick.
    pub stall_decay: f32,
    /// Number of past speed measurements forming the rolling baseline.
    pub baseline_window: usize,
    /// Number of past energy samples retained per stream.
    pub history_window: usize,
    /// Consecutive stalled ticks after which a stream is considered idle.
    pub idle_after_stalled_ticks: u32,
    /// Entropy (bits) that maps to zero certainty.
    pub max_entropy: f32,
    /// Upper bound on samples drained from one stream in one tick.
    pub max_samples_per_tick: usize,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            speed_weight: 0.6,
            certainty_weight: 0.4,
            stall_decay: 0.85,
            baseline_window: 120,
            history_window: 60,
            idle_after_stalled_ticks: 30,
            max_entropy: 8.0,
            max_samples_per_tick: 256,
        }
    }
}

/// Stream coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Number of recent ticks (K) used for the interference covariance.
    pub interference_window: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            interference_window: 10,
        }
    }
}

/// Adaptation controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Level the session starts at.
    pub initial_quality: QualityLevel,
    /// Consecutive healthy ticks required to step up one level.
    pub promote_after_healthy_ticks: u32,
    /// Consecutive overrunning ticks required to step down one level.
    pub demote_after_overruns: u32,
    /// A tick is healthy when it consumes less than this fraction of its
    /// budget and does not overrun.
    pub healthy_budget_fraction: f32,
    /// Battery level (percent) below which `Low` is forced.
    pub battery_force_low_percent: f32,
    /// Battery level (percent) at or above which the battery force clears.
    pub battery_clear_percent: f32,
    /// Thermal state at or above which `Low` is forced.
    pub thermal_force_low: ThermalStatus,
    /// Number of tick timings kept for the rolling statistics.
    pub stats_window: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            initial_quality: QualityLevel::High,
            promote_after_healthy_ticks: 60,
            demote_after_overruns: 3,
            healthy_budget_fraction: 0.8,
            battery_force_low_percent: 10.0,
            battery_clear_percent: 15.0,
            thermal_force_low: ThermalStatus::Critical,
            stats_window: 120,
        }
    }
}

/// Extension budget guard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Budget given to extensions registered without an explicit one.
    pub default_budget_ms: f32,
    /// Consecutive overruns after which an extension is throttled.
    pub overrun_ceiling: u32,
    /// Ticks to wait for extension workers on shutdown before abandoning them.
    pub cancel_grace_ticks: u32,
    /// Time held back from extensions for the controller and emitter stages.
    pub emit_reserve_ms: f32,
    /// Capacity of each extension worker's job channel.
    pub job_capacity: usize,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            default_budget_ms: 2.0,
            overrun_ceiling: 3,
            cancel_grace_ticks: 2,
            emit_reserve_ms: 1.0,
            job_capacity: 1,
        }
    }
}

/// Event emitter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Frames buffered ahead of a slow sink. Older frames are dropped first.
    pub queue_capacity: usize,
    /// How long shutdown waits for the sink to take the terminal frame.
    pub shutdown_grace_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1,
            shutdown_grace_ms: 50,
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ticks between two aggregate reports.
    pub report_interval_ticks: u64,
    /// Capacity of the channel feeding the telemetry sink worker.
    pub channel_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            report_interval_ticks: 60,
            channel_capacity: 256,
        }
    }
}

/// Inference feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Capacity of each per-stream sample channel.
    pub channel_capacity: usize,
    /// Capacity of the runtime command channel.
    pub command_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            command_capacity: 64,
        }
    }
}

/// The complete configuration of a session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frame clock.
    pub clock: ClockConfig,
    /// Token energy calculators.
    pub energy: EnergyConfig,
    /// Stream coordinator.
    pub fusion: FusionConfig,
    /// Adaptation controller.
    pub adaptation: AdaptationConfig,
    /// Extension guard.
    pub extensions: ExtensionConfig,
    /// Event emitter.
    pub emitter: EmitterConfig,
    /// Telemetry.
    pub telemetry: TelemetryConfig,
    /// Inference feeds.
    pub feeds: FeedConfig,
    /// Streams known at startup.
    pub streams: Vec<StreamConfig>,
}

impl SessionConfig {
    /// Checks every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in self.float_settings() {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }

        if !(self.clock.tick_interval_ms > 0.0) {
            return Err(ConfigError::ZeroTickInterval);
        }

        let energy = &self.energy;
        if energy.speed_weight < 0.0
            || energy.certainty_weight < 0.0
            || energy.speed_weight + energy.certainty_weight <= 0.0
        {
            return Err(ConfigError::InvalidEnergyWeights);
        }
        if !(energy.stall_decay > 0.0 && energy.stall_decay < 1.0) {
            return Err(ConfigError::InvalidStallDecay(energy.stall_decay));
        }
        if !(energy.max_entropy > 0.0) {
            return Err(ConfigError::InvalidMaxEntropy);
        }
        if energy.baseline_window == 0 {
            return Err(ConfigError::WindowTooSmall("energy.baseline_window", 1));
        }
        if energy.history_window == 0 {
            return Err(ConfigError::WindowTooSmall("energy.history_window", 1));
        }
        if energy.max_samples_per_tick == 0 {
            return Err(ConfigError::ZeroCapacity("energy.max_samples_per_tick"));
        }
        if self.fusion.interference_window < 2 {
            return Err(ConfigError::WindowTooSmall("fusion.interference_window", 2));
        }

        let adaptation = &self.adaptation;
        if adaptation.demote_after_overruns == 0 {
            return Err(ConfigError::ZeroDemotionThreshold);
        }
        if adaptation.promote_after_healthy_ticks <= adaptation.demote_after_overruns {
            return Err(ConfigError::SymmetricHysteresis {
                promote: adaptation.promote_after_healthy_ticks,
                demote: adaptation.demote_after_overruns,
            });
        }
        if !(adaptation.healthy_budget_fraction > 0.0 && adaptation.healthy_budget_fraction <= 1.0)
        {
            return Err(ConfigError::InvalidHealthyFraction(
                adaptation.healthy_budget_fraction,
            ));
        }
        if adaptation.battery_clear_percent < adaptation.battery_force_low_percent {
            return Err(ConfigError::BatteryThresholds {
                force: adaptation.battery_force_low_percent,
                clear: adaptation.battery_clear_percent,
            });
        }
        if adaptation.stats_window == 0 {
            return Err(ConfigError::WindowTooSmall("adaptation.stats_window", 1));
        }

        if !(self.extensions.default_budget_ms > 0.0) {
            return Err(ConfigError::InvalidExtensionBudget);
        }
        if self.extensions.emit_reserve_ms < 0.0 {
            return Err(ConfigError::NegativeEmitReserve(
                self.extensions.emit_reserve_ms,
            ));
        }
        if self.extensions.overrun_ceiling == 0 {
            return Err(ConfigError::ZeroOverrunCeiling);
        }
        if self.extensions.job_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("extensions.job_capacity"));
        }
        if self.emitter.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("emitter.queue_capacity"));
        }
        if self.telemetry.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("telemetry.channel_capacity"));
        }
        if self.telemetry.report_interval_ticks == 0 {
            return Err(ConfigError::ZeroCapacity("telemetry.report_interval_ticks"));
        }
        if self.feeds.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("feeds.channel_capacity"));
        }
        if self.feeds.command_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("feeds.command_capacity"));
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if !stream.has_valid_weight() {
                return Err(ConfigError::InvalidStreamWeight(stream.id.clone()));
            }
            if !seen.insert(&stream.id) {
                return Err(ConfigError::DuplicateStream(stream.id.clone()));
            }
        }

        Ok(())
    }

    fn float_settings(&self) -> [(&'static str, f32); 10] {
        [
            ("clock.tick_interval_ms", self.clock.tick_interval_ms),
            ("energy.speed_weight", self.energy.speed_weight),
            ("energy.certainty_weight", self.energy.certainty_weight),
            ("energy.stall_decay", self.energy.stall_decay),
            ("energy.max_entropy", self.energy.max_entropy),
            (
                "adaptation.healthy_budget_fraction",
                self.adaptation.healthy_budget_fraction,
            ),
            (
                "adaptation.battery_force_low_percent",
                self.adaptation.battery_force_low_percent,
            ),
            (
                "adaptation.battery_clear_percent",
                self.adaptation.battery_clear_percent,
            ),
            ("extensions.default_budget_ms", self.extensions.default_budget_ms),
            ("extensions.emit_reserve_ms", self.extensions.emit_reserve_ms),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_default_interval_is_60hz() {
        let interval = ClockConfig::default().interval();
        assert!(interval > Duration::from_millis(16));
        assert!(interval < Duration::from_millis(17));
    }

    #[test]
    fn test_equal_hysteresis_is_rejected() {
        let mut config = SessionConfig::default();
        config.adaptation.promote_after_healthy_ticks = 3;
        config.adaptation.demote_after_overruns = 3;
        assert_eq!(
            config.validate(),
            Err(ConfigError::SymmetricHysteresis {
                promote: 3,
                demote: 3
            })
        );
    }

    #[test]
    fn test_decay_bounds() {
        let mut config = SessionConfig::default();
        config.energy.stall_decay = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStallDecay(_))
        ));
    }

    #[test]
    fn test_battery_thresholds_must_not_invert() {
        let mut config = SessionConfig::default();
        config.adaptation.battery_clear_percent = 5.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BatteryThresholds { .. })
        ));
    }

    fn rejected_field(edit: impl FnOnce(&mut SessionConfig)) -> Option<&'static str> {
        let mut config = SessionConfig::default();
        edit(&mut config);
        match config.validate() {
            Err(ConfigError::NonFinite { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_infinite_tick_interval_rejected() {
        assert_eq!(
            rejected_field(|c| c.clock.tick_interval_ms = f32::INFINITY),
            Some("clock.tick_interval_ms")
        );
    }

    #[test]
    fn test_non_finite_energy_settings_rejected() {
        assert_eq!(
            rejected_field(|c| c.energy.speed_weight = f32::NAN),
            Some("energy.speed_weight")
        );
        assert_eq!(
            rejected_field(|c| c.energy.certainty_weight = f32::INFINITY),
            Some("energy.certainty_weight")
        );
        assert_eq!(
            rejected_field(|c| c.energy.stall_decay = f32::NAN),
            Some("energy.stall_decay")
        );
        assert_eq!(
            rejected_field(|c| c.energy.max_entropy = f32::INFINITY),
            Some("energy.max_entropy")
        );
    }

    #[test]
    fn test_non_finite_adaptation_settings_rejected() {
        assert_eq!(
            rejected_field(|c| c.adaptation.healthy_budget_fraction = f32::NAN),
            Some("adaptation.healthy_budget_fraction")
        );
        // NaN would slip past the inverted-threshold comparison.
        assert_eq!(
            rejected_field(|c| c.adaptation.battery_force_low_percent = f32::NAN),
            Some("adaptation.battery_force_low_percent")
        );
        assert_eq!(
            rejected_field(|c| c.adaptation.battery_clear_percent = f32::INFINITY),
            Some("adaptation.battery_clear_percent")
        );
    }

    #[test]
    fn test_non_finite_extension_budgets_rejected() {
        assert_eq!(
            rejected_field(|c| c.extensions.default_budget_ms = f32::INFINITY),
            Some("extensions.default_budget_ms")
        );
        assert_eq!(
            rejected_field(|c| c.extensions.emit_reserve_ms = f32::NAN),
            Some("extensions.emit_reserve_ms")
        );
    }

    #[test]
    fn test_negative_emit_reserve_rejected() {
        let mut config = SessionConfig::default();
        config.extensions.emit_reserve_ms = -1.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NegativeEmitReserve(-1.0))
        );
        config.extensions.emit_reserve_ms = 0.0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_infinite_interval_from_toml_rejected() {
        let config: SessionConfig = toml::from_str(
            r#"
            [clock]
            tick_interval_ms = inf
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFinite { field: "clock.tick_interval_ms", .. })
        ));
    }

    #[test]
    fn test_duplicate_streams_rejected() {
        let mut config = SessionConfig::default();
        config.streams = vec![StreamConfig::new("a"), StreamConfig::new("a")];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateStream(StreamId::new("a")))
        );
    }

    #[test]
    fn test_zero_queue_rejected() {
        let mut config = SessionConfig::default();
        config.emitter.queue_capacity = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCapacity("emitter.queue_capacity"))
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            [clock]
            tick_interval_ms = 8.0

            [adaptation]
            demote_after_overruns = 2

            [[streams]]
            id = "model-a"
            weight = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.clock.tick_interval_ms, 8.0);
        assert_eq!(config.adaptation.demote_after_overruns, 2);
        assert_eq!(config.adaptation.promote_after_healthy_ticks, 60);
        assert_eq!(config.streams[0].weight, 2.0);
        assert_eq!(config.energy, EnergyConfig::default());
        assert!(config.validate().is_ok());
    }
}
