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

//! The capability interface for optional third-party per-tick processing.
//!
//! An extension is any type implementing [`Extension`]. It is registered with
//! a time budget and then invoked once per tick, on its own worker thread,
//! with a read-only [`TickView`] of the fused frame. The guard in
//! `cadence-control` measures every invocation and throttles extensions that
//! repeatedly exceed their budget.

use crate::quality::QualityLevel;
use crate::stream::{FusedEnergyFrame, StreamId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered extension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    /// Creates an extension identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Read-only summary of the current tick handed to extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct TickView {
    /// The tick being processed.
    pub tick_id: u64,
    /// Quality level in effect for this tick. Extensions should scale their
    /// own work with it.
    pub quality: QualityLevel,
    /// The fused energy.
    pub total_energy: f32,
    /// The interference score, if computed this tick.
    pub interference_score: Option<f32>,
    /// Per-stream energy values.
    pub streams: Vec<(StreamId, f32)>,
}

impl TickView {
    /// Builds a view from a fused frame.
    pub fn from_frame(frame: &FusedEnergyFrame, quality: QualityLevel) -> Self {
        Self {
            tick_id: frame.tick_id,
            quality,
            total_energy: frame.total_energy,
            interference_score: frame.interference_score,
            streams: frame
                .per_stream
                .iter()
                .map(|(id, sample)| (id.clone(), sample.value))
                .collect(),
        }
    }
}

/// An optional per-tick callback.
///
/// The single entry point is invoked on a dedicated worker thread. Its
/// duration is observed by the caller; an implementation has no way to
/// extend its own budget.
pub trait Extension: Send + 'static {
    /// Processes one tick.
    fn on_tick(&mut self, view: &TickView);
}

impl<F> Extension for F
where
    F: FnMut(&TickView) + Send + 'static,
{
    fn on_tick(&mut self, view: &TickView) {
        self(view)
    }
}

/// Bookkeeping for one registered extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionHandle {
    /// The extension's identifier.
    pub id: ExtensionId,
    /// The extension's own per-tick budget in milliseconds.
    pub budget_ms: f32,
    /// Duration of the most recent observed invocation.
    pub last_duration_ms: f32,
    /// Overruns in a row. Reset by any invocation that stays within budget.
    pub consecutive_overruns: u32,
    /// Once set, the extension is skipped until an explicit reset.
    pub throttled: bool,
}

impl ExtensionHandle {
    /// Creates a fresh handle.
    pub fn new(id: ExtensionId, budget_ms: f32) -> Self {
        Self {
            id,
            budget_ms,
            last_duration_ms: 0.0,
            consecutive_overruns: 0,
            throttled: false,
        }
    }

    /// Clears the throttle and the overrun streak.
    pub fn reset(&mut self) {
        self.consecutive_overruns = 0;
        self.throttled = false;
    }
}
