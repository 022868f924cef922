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

//! The public-facing API of Cadence.
//!
//! A session ingests token-timing samples from one or more inference
//! streams, turns them into a fused energy frame every tick, and emits one
//! [`FrameEvent`](cadence_core::FrameEvent) per tick, degrading its own
//! workload whenever the deadline is at risk.
//!
//! Build a session with [`SessionBuilder`], then either step it by hand with
//! [`Session::run_tick`] or move it onto its own tick thread with
//! [`Session::spawn`].

#![warn(missing_docs)]

pub mod clock;
pub mod command;
mod emitter;
pub mod error;
pub mod feed;
pub mod orchestrator;
pub mod session;
pub mod sinks;

pub use clock::{FrameClock, ManualClock, Tick};
pub use command::{Command, CommandSender};
pub use error::{CommandError, FeedError, SessionError};
pub use feed::{FeedReceiver, FeedSender};
pub use orchestrator::{CycleOrchestrator, SessionState, SessionSummary, TickOutcome};
pub use session::{Session, SessionBuilder, SessionHandle};
pub use sinks::{ChannelSink, JsonLinesSink};

/// Common types for building and driving sessions.
pub mod prelude {
    pub use crate::{
        ChannelSink, FeedSender, JsonLinesSink, Session, SessionBuilder, SessionHandle,
        SessionSummary,
    };
    pub use cadence_core::{
        DeviceTelemetry, Extension, ExtensionId, FrameEvent, QualityLevel, SessionConfig,
        StreamConfig, StreamId, ThermalStatus, TickView, TokenSample,
    };
}
