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

//! Provides the foundational traits and data structures for session telemetry.
//!
//! This module defines the "common language" for metrics and observability:
//! metric identifiers and values, the closed set of telemetry events a session
//! produces, and the sink contract. `cadence-telemetry` provides the service
//! that aggregates and forwards them.

pub mod event;
pub mod metrics;

pub use self::event::{TelemetryEvent, TelemetryReport, TelemetrySink};
pub use self::metrics::{
    Histogram, Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult,
};
