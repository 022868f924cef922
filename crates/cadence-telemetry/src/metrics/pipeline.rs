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

//! The counters, gauges and histograms every session maintains.

use super::registry::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry};
use cadence_core::telemetry::MetricsResult;
use cadence_core::{QualityLevel, TickTiming};

/// Bucket bounds for tick and stage durations, in milliseconds.
pub const DURATION_BUCKETS_MS: [f64; 10] = [1.0, 2.0, 4.0, 8.0, 12.0, 16.67, 25.0, 33.3, 50.0, 100.0];

/// Handles to the fixed set of session metrics.
///
/// Recording never fails from the caller's point of view: a backend error is
/// logged and the sample is lost.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    frames_emitted: CounterHandle,
    frames_dropped: CounterHandle,
    samples_dropped: CounterHandle,
    tick_overruns: CounterHandle,
    clock_skipped_ticks: CounterHandle,
    extension_overruns: CounterHandle,
    telemetry_dropped: CounterHandle,
    quality_level: GaugeHandle,
    tick_duration: HistogramHandle,
    extension_stage: HistogramHandle,
}

impl PipelineMetrics {
    /// Registers (or re-attaches to) the session metrics in `registry`.
    pub fn register(registry: &MetricsRegistry) -> MetricsResult<Self> {
        let buckets = DURATION_BUCKETS_MS.to_vec();
        Ok(Self {
            frames_emitted: registry.register_counter(
                "emitter",
                "frames_emitted",
                "Frames handed to the event sink",
            )?,
            frames_dropped: registry.register_counter(
                "emitter",
                "frames_dropped",
                "Frames dropped because the event sink lagged",
            )?,
            samples_dropped: registry.register_counter(
                "feed",
                "samples_dropped",
                "Token samples discarded (out of order, invalid or overflow)",
            )?,
            tick_overruns: registry.register_counter(
                "tick",
                "overruns",
                "Ticks that exceeded their nominal interval",
            )?,
            clock_skipped_ticks: registry.register_counter(
                "clock",
                "skipped_ticks",
                "Clock slots skipped because the loop fell behind",
            )?,
            extension_overruns: registry.register_counter(
                "extensions",
                "overruns",
                "Extension invocations that exceeded their budget",
            )?,
            telemetry_dropped: registry.register_counter(
                "telemetry",
                "events_dropped",
                "Telemetry events dropped because the sink lagged",
            )?,
            quality_level: registry.register_gauge(
                "session",
                "quality_level",
                "Current quality level (0 = Low, 2 = High)",
                "level",
            )?,
            tick_duration: registry.register_histogram(
                "tick",
                "duration",
                "Consumed time per tick",
                "ms",
                buckets.clone(),
            )?,
            extension_stage: registry.register_histogram(
                "extensions",
                "stage_duration",
                "Time spent in the extension stage per tick",
                "ms",
                buckets,
            )?,
        })
    }

    /// Records the finalized timing of a tick.
    pub fn record_tick(&self, timing: &TickTiming) {
        note(self.tick_duration.observe(f64::from(timing.consumed_ms)));
        if timing.overrun {
            note(self.tick_overruns.increment());
        }
    }

    /// Records the current quality level.
    pub fn set_quality(&self, level: QualityLevel) {
        note(self.quality_level.set(f64::from(level.as_u8())));
    }

    /// Counts one frame delivered to the sink.
    pub fn frame_emitted(&self) {
        note(self.frames_emitted.increment());
    }

    /// Counts frames dropped ahead of a slow sink.
    pub fn frames_dropped(&self, count: u64) {
        if count > 0 {
            note(self.frames_dropped.increment_by(count));
        }
    }

    /// Counts discarded token samples.
    pub fn samples_dropped(&self, count: u64) {
        if count > 0 {
            note(self.samples_dropped.increment_by(count));
        }
    }

    /// Counts clock slots skipped.
    pub fn clock_skipped(&self, count: u64) {
        if count > 0 {
            note(self.clock_skipped_ticks.increment_by(count));
        }
    }

    /// Counts extension overruns.
    pub fn extension_overruns(&self, count: u64) {
        if count > 0 {
            note(self.extension_overruns.increment_by(count));
        }
    }

    /// Counts one telemetry event lost to backpressure.
    pub fn telemetry_dropped(&self) {
        note(self.telemetry_dropped.increment());
    }

    /// Histogram fed by a scoped timer around the extension stage.
    pub fn extension_stage(&self) -> &HistogramHandle {
        &self.extension_stage
    }

    /// Total frames delivered.
    pub fn frames_emitted_total(&self) -> u64 {
        self.frames_emitted.get().unwrap_or(0)
    }

    /// Total frames dropped.
    pub fn frames_dropped_total(&self) -> u64 {
        self.frames_dropped.get().unwrap_or(0)
    }

    /// Total samples discarded.
    pub fn samples_dropped_total(&self) -> u64 {
        self.samples_dropped.get().unwrap_or(0)
    }

    /// Total ticks that overran.
    pub fn tick_overruns_total(&self) -> u64 {
        self.tick_overruns.get().unwrap_or(0)
    }

    /// Total clock slots skipped.
    pub fn clock_skipped_total(&self) -> u64 {
        self.clock_skipped_ticks.get().unwrap_or(0)
    }

    /// Total extension overruns.
    pub fn extension_overruns_total(&self) -> u64 {
        self.extension_overruns.get().unwrap_or(0)
    }

    /// Total telemetry events dropped.
    pub fn telemetry_dropped_total(&self) -> u64 {
        self.telemetry_dropped.get().unwrap_or(0)
    }
}

fn note<T>(result: MetricsResult<T>) {
    if let Err(e) = result {
        log::warn!("Telemetry: metric update failed: {e}");
    }
}
