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

//! The event payloads a session emits, and the sink contract that receives
//! them.
//!
//! Exactly one [`FrameEvent`] is produced per tick. Quality transitions ride
//! inside the frame of the tick that caused them, so consumers see a single
//! ordered stream.

use crate::quality::QualityLevel;
use crate::stream::{FusedEnergyFrame, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why the quality level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// Consecutive tick overruns reached the demotion threshold.
    OverrunThreshold,
    /// Enough consecutive healthy ticks to step back up.
    SustainedHeadroom,
    /// Battery dropped below the forcing threshold.
    BatteryLow,
    /// The device reported a thermal state at or above the forcing level.
    ThermalCritical,
}

impl TransitionCause {
    /// Returns `true` for causes that come from device telemetry rather than
    /// tick timing.
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            TransitionCause::BatteryLow | TransitionCause::ThermalCritical
        )
    }
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionCause::OverrunThreshold => "overrun_threshold",
            TransitionCause::SustainedHeadroom => "sustained_headroom",
            TransitionCause::BatteryLow => "battery_low",
            TransitionCause::ThermalCritical => "thermal_critical",
        };
        f.write_str(name)
    }
}

/// A degradation or restoration of the session quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTransition {
    /// The tick whose measurements triggered the change. The new level is in
    /// effect from the following tick.
    pub tick_id: u64,
    /// Previous level.
    pub from: QualityLevel,
    /// New level.
    pub to: QualityLevel,
    /// What triggered it.
    pub cause: TransitionCause,
}

impl QualityTransition {
    /// Returns `true` if the transition lowers the quality.
    pub fn is_degradation(&self) -> bool {
        self.to < self.from
    }
}

/// The serialized per-tick event handed to an [`EventSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    /// Monotonic tick counter.
    pub tick_id: u64,
    /// Wall-clock time of the tick in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Quality level in effect while this tick was computed.
    pub quality_level: QualityLevel,
    /// Fused energy in `[0, 1]`.
    pub total_energy: f32,
    /// `null` when interference analysis was skipped.
    pub interference_score: Option<f32>,
    /// Streams with non-zero confidence.
    pub active_stream_count: usize,
    /// Energy value per stream.
    pub streams: BTreeMap<StreamId, f32>,
    /// Set on the tick that changed the quality level.
    pub degradation_event: Option<QualityTransition>,
    /// Set only on the final frame of a session.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
}

impl FrameEvent {
    /// Consumes a fused frame into its emitted form.
    pub fn from_frame(
        frame: FusedEnergyFrame,
        quality_level: QualityLevel,
        degradation_event: Option<QualityTransition>,
    ) -> Self {
        Self {
            tick_id: frame.tick_id,
            timestamp_ms: frame.timestamp_ms,
            quality_level,
            total_energy: frame.total_energy,
            interference_score: frame.interference_score,
            active_stream_count: frame.active_stream_count,
            streams: frame
                .per_stream
                .into_iter()
                .map(|(id, sample)| (id, sample.value))
                .collect(),
            degradation_event,
            terminal: false,
        }
    }

    /// Marks this as the last frame of the session.
    pub fn into_terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// Receiver of the per-tick event stream.
///
/// Sinks run on the emitter's worker thread, never on the tick thread, so an
/// implementation may block (network, disk). While it blocks, newer frames
/// replace older unsent ones.
pub trait EventSink: Send + 'static {
    /// Delivers one frame.
    fn emit(&mut self, event: FrameEvent);

    /// Called once after the terminal frame has been delivered.
    fn flush(&mut self) {}
}
