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

//! Event types for session observability.

use crate::budget::TickTiming;
use crate::event::QualityTransition;
use crate::extension::ExtensionId;
use crate::quality::QualityLevel;
use crate::session::SessionId;
use crate::stream::StreamId;
use serde::{Deserialize, Serialize};

/// The periodic aggregate handed to a [`TelemetrySink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Session that produced the report.
    pub session_id: SessionId,
    /// Last tick covered by the report.
    pub tick_id: u64,
    /// Quality level at report time.
    pub quality_level: QualityLevel,
    /// Mean tick duration over the rolling window.
    pub avg_tick_ms: f32,
    /// 95th percentile tick duration over the rolling window.
    pub p95_tick_ms: f32,
    /// Overrunning ticks since the session started.
    pub overrun_count: u64,
    /// Extensions currently throttled.
    pub throttled_extensions: Vec<ExtensionId>,
    /// Frames dropped because the event sink lagged.
    pub frames_dropped: u64,
    /// Token samples discarded (out of order or feed overflow).
    pub samples_dropped: u64,
    /// Clock slots skipped because the loop fell behind.
    pub clock_skipped_ticks: u64,
}

/// A telemetry event produced by the tick loop.
///
/// The set is closed: every observable anomaly or state change of a session
/// is one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A session has started.
    SessionStarted {
        /// The new session.
        session_id: SessionId,
        /// Quality level at start.
        quality_level: QualityLevel,
    },
    /// The finalized timing of one tick.
    TickTimed(TickTiming),
    /// The quality level changed.
    QualityChanged(QualityTransition),
    /// An extension exceeded its budget or the remaining tick time.
    ExtensionOverrun {
        /// Tick of the invocation.
        tick_id: u64,
        /// The offending extension.
        extension: ExtensionId,
        /// Observed (or, if abandoned, granted) duration.
        duration_ms: f32,
        /// The extension's own budget.
        budget_ms: f32,
        /// `true` if the tick stopped waiting for the result.
        abandoned: bool,
    },
    /// An extension was throttled and will be skipped until reset.
    ExtensionThrottled {
        /// Tick at which the ceiling was reached.
        tick_id: u64,
        /// The throttled extension.
        extension: ExtensionId,
        /// The overrun streak that triggered the throttle.
        consecutive_overruns: u32,
    },
    /// An extension panicked or its worker disappeared.
    ExtensionFailed {
        /// Tick at which the failure was noticed.
        tick_id: u64,
        /// The failed extension.
        extension: ExtensionId,
        /// Description of the failure.
        reason: String,
    },
    /// A frame was dropped because the sink could not keep up.
    FrameDropped {
        /// The dropped frame.
        tick_id: u64,
    },
    /// A token sample was discarded.
    SampleDiscarded {
        /// The sample's stream.
        stream: StreamId,
        /// The discarded sequence number.
        sequence_no: u64,
        /// The last sequence number accepted for that stream.
        last_accepted: Option<u64>,
    },
    /// The periodic aggregate.
    Report(TelemetryReport),
    /// The session has stopped. Always the last event.
    SessionStopped {
        /// The stopped session.
        session_id: SessionId,
        /// The terminal tick.
        tick_id: u64,
    },
}

/// Receiver of telemetry events.
///
/// Runs on the telemetry worker thread, never on the tick thread.
pub trait TelemetrySink: Send + 'static {
    /// Receives one event.
    fn record(&mut self, event: &TelemetryEvent);
}
