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

//! # Cadence Core
//!
//! Foundational crate containing the records, traits, and configuration
//! shared by every stage of the frame-budgeted token-energy pipeline.

#![warn(missing_docs)]

pub mod budget;
pub mod config;
pub mod error;
pub mod event;
pub mod extension;
pub mod platform;
pub mod quality;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod utils;

pub use budget::{TickBudget, TickTiming};
pub use config::{ConfigError, SessionConfig};
pub use error::StartupError;
pub use event::{EventSink, FrameEvent, QualityTransition, TransitionCause};
pub use extension::{Extension, ExtensionHandle, ExtensionId, TickView};
pub use platform::{Clock, DeviceTelemetry, HardwareMonitor, SystemClock, ThermalStatus};
pub use quality::QualityLevel;
pub use session::SessionId;
pub use stream::{EnergySample, FusedEnergyFrame, StreamConfig, StreamId, TokenSample};
pub use telemetry::{TelemetryEvent, TelemetryReport, TelemetrySink};
pub use utils::{RingBuffer, Stopwatch};
