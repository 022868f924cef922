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

//! Records flowing through the pipeline: raw token samples from inference
//! adapters, per-stream energy samples, and the fused per-tick frame.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of one model output stream (e.g. `"model-a"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-stream configuration supplied at startup or through a runtime command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// The stream identifier.
    pub id: StreamId,
    /// Relative weight of this stream in the fused energy. Defaults to `1.0`.
    #[serde(default = "default_stream_weight")]
    pub weight: f32,
}

fn default_stream_weight() -> f32 {
    1.0
}

impl StreamConfig {
    /// A stream with the default weight.
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            weight: default_stream_weight(),
        }
    }

    /// Overrides the fusion weight.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// `true` if the weight is finite and not negative.
    pub fn has_valid_weight(&self) -> bool {
        self.weight.is_finite() && self.weight >= 0.0
    }
}

/// One token-timing observation produced by an inference adapter.
///
/// Samples are immutable and consumed exactly once, by the energy calculator
/// of their stream, during the first tick after they were buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSample {
    /// The stream that produced the token.
    pub stream_id: StreamId,
    /// Strictly increasing per stream. Non-monotonic samples are discarded.
    pub sequence_no: u64,
    /// When the adapter observed the token.
    pub arrival_time: Instant,
    /// Delay since the previous token of the same stream.
    pub inter_token_delay: Duration,
    /// Entropy of the token distribution, in bits.
    pub token_entropy: f32,
}

impl TokenSample {
    /// Creates a sample stamped with the current instant.
    pub fn new(
        stream_id: impl Into<StreamId>,
        sequence_no: u64,
        inter_token_delay: Duration,
        token_entropy: f32,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence_no,
            arrival_time: Instant::now(),
            inter_token_delay,
            token_entropy,
        }
    }
}

/// The normalized energy of one stream for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySample {
    /// The stream this sample was measured on.
    pub stream_id: StreamId,
    /// The tick this sample belongs to.
    pub tick_id: u64,
    /// Energy in `[0, 1]`.
    pub value: f32,
    /// Confidence in `[0, 1]`. Exactly `0.0` means the stream is idle, which
    /// is distinct from a measured low energy.
    pub confidence: f32,
}

impl EnergySample {
    /// An idle stream: no measurement at all.
    pub fn idle(stream_id: impl Into<StreamId>, tick_id: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            tick_id,
            value: 0.0,
            confidence: 0.0,
        }
    }

    /// Returns `true` when the stream contributes to fusion this tick.
    pub fn is_active(&self) -> bool {
        self.confidence > 0.0
    }
}

/// The canonical per-tick output record of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEnergyFrame {
    /// Monotonic tick counter.
    pub tick_id: u64,
    /// Wall-clock timestamp of the tick start, in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Confidence-weighted average of the active streams.
    pub total_energy: f32,
    /// Every known stream's sample for this tick, including idle ones.
    pub per_stream: BTreeMap<StreamId, EnergySample>,
    /// Agreement (`> 0`) or divergence (`< 0`) of recent stream energies.
    /// `None` when the analysis was skipped.
    pub interference_score: Option<f32>,
    /// Number of streams with non-zero confidence.
    pub active_stream_count: usize,
}
