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

//! Metrics, telemetry reporting and logging for Cadence sessions.
//!
//! A session owns one [`TelemetryService`]. The tick loop updates the
//! [`PipelineMetrics`] in place and queues [`TelemetryEvent`]s, which a
//! worker thread delivers to the configured sink.
//!
//! [`TelemetryEvent`]: cadence_core::TelemetryEvent

#![warn(missing_docs)]

pub mod logging;
pub mod metrics;
pub mod service;
pub mod sinks;
pub mod storage;
pub mod utils;

pub use metrics::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry, PipelineMetrics};
pub use service::TelemetryService;
pub use sinks::{ChannelTelemetrySink, LogTelemetrySink};
pub use storage::{InMemoryBackend, MetricsBackend};
pub use utils::ScopedMetricTimer;
