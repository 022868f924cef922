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

//! Converts one stream's buffered token samples into a per-tick energy value.
//!
//! Energy mixes two terms:
//!
//! - a **speed** term, the inverse mean inter-token delay relative to a
//!   rolling baseline of this stream's own past speeds, mapped through
//!   `r / (1 + r)` so that baseline speed scores `0.5`;
//! - a **certainty** term, `1 - entropy / max_entropy`, so confident tokens
//!   score higher.
//!
//! A tick without samples is a stall: the previous value decays
//! geometrically instead of dropping to zero, and after enough stalled ticks
//! the stream is reported idle (`confidence == 0`).

use cadence_core::config::EnergyConfig;
use cadence_core::stream::{EnergySample, StreamId, TokenSample};
use cadence_core::utils::RingBuffer;

/// Floor applied to the mean inter-token delay, in seconds.
const MIN_DELAY_SECS: f32 = 1.0e-4;

/// A sample rejected by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscardedSample {
    /// Sequence number of the rejected sample.
    pub sequence_no: u64,
    /// Last sequence number accepted before it.
    pub last_accepted: Option<u64>,
}

/// The result of one tick of computation for one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorOutput {
    /// The energy sample for this tick.
    pub sample: EnergySample,
    /// Samples dropped this tick for being out of order or malformed.
    pub discarded: Vec<DiscardedSample>,
}

/// Energy state of a single stream.
#[derive(Debug, Clone)]
pub struct TokenEnergyCalculator {
    stream_id: StreamId,
    config: EnergyConfig,
    last_sequence: Option<u64>,
    speed_baseline: RingBuffer<f32>,
    history: RingBuffer<EnergySample>,
    previous: Option<EnergySample>,
    stalled_ticks: u32,
    discarded_total: u64,
}

impl TokenEnergyCalculator {
    /// Creates a calculator with empty history.
    pub fn new(stream_id: StreamId, config: EnergyConfig) -> Self {
        Self {
            speed_baseline: RingBuffer::new(config.baseline_window),
            history: RingBuffer::new(config.history_window),
            stream_id,
            config,
            last_sequence: None,
            previous: None,
            stalled_ticks: 0,
            discarded_total: 0,
        }
    }

    /// The stream this calculator belongs to.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Computes this tick's energy from the samples buffered since the
    /// previous tick.
    ///
    /// Samples whose sequence number does not strictly increase, or whose
    /// entropy is not a finite number, are discarded and reported back.
    pub fn compute<I>(&mut self, tick_id: u64, samples: I) -> CalculatorOutput
    where
        I: IntoIterator<Item = TokenSample>,
    {
        let mut discarded = Vec::new();
        let mut accepted = 0usize;
        let mut delay_sum = 0.0f32;
        let mut entropy_sum = 0.0f32;

        for sample in samples {
            let in_order = self
                .last_sequence
                .map_or(true, |last| sample.sequence_no > last);
            if !in_order || !sample.token_entropy.is_finite() {
                log::warn!(
                    "Energy: discarding sample {} on stream '{}' (last accepted {:?})",
                    sample.sequence_no,
                    self.stream_id,
                    self.last_sequence
                );
                discarded.push(DiscardedSample {
                    sequence_no: sample.sequence_no,
                    last_accepted: self.last_sequence,
                });
                continue;
            }
            self.last_sequence = Some(sample.sequence_no);
            accepted += 1;
            delay_sum += sample.inter_token_delay.as_secs_f32();
            entropy_sum += sample.token_entropy.max(0.0);
        }
        self.discarded_total += discarded.len() as u64;

        let sample = if accepted > 0 {
            let n = accepted as f32;
            self.measure(tick_id, delay_sum / n, entropy_sum / n)
        } else {
            self.stall(tick_id)
        };

        self.previous = Some(sample.clone());
        self.history.push(sample.clone());
        log::trace!(
            "Energy: stream '{}' tick {} -> value {:.3} confidence {:.3} ({} samples)",
            self.stream_id,
            tick_id,
            sample.value,
            sample.confidence,
            accepted
        );

        CalculatorOutput { sample, discarded }
    }

    fn measure(&mut self, tick_id: u64, mean_delay_secs: f32, mean_entropy: f32) -> EnergySample {
        let speed = 1.0 / mean_delay_secs.max(MIN_DELAY_SECS);
        let speed_term = if self.speed_baseline.is_empty() {
            0.5
        } else {
            let baseline = self.speed_baseline.average().max(f32::EPSILON);
            let relative = speed / baseline;
            relative / (1.0 + relative)
        };
        self.speed_baseline.push(speed);

        let certainty = 1.0 - (mean_entropy / self.config.max_entropy).clamp(0.0, 1.0);

        let weight_sum = self.config.speed_weight + self.config.certainty_weight;
        let value = (self.config.speed_weight * speed_term
            + self.config.certainty_weight * certainty)
            / weight_sum;

        self.stalled_ticks = 0;
        EnergySample {
            stream_id: self.stream_id.clone(),
            tick_id,
            value: value.clamp(0.0, 1.0),
            confidence: (0.5 + 0.5 * certainty).clamp(0.0, 1.0),
        }
    }

    fn stall(&mut self, tick_id: u64) -> EnergySample {
        let Some((last_value, last_confidence)) =
            self.previous.as_ref().map(|s| (s.value, s.confidence))
        else {
            return EnergySample::idle(self.stream_id.clone(), tick_id);
        };

        self.stalled_ticks = self.stalled_ticks.saturating_add(1);
        let decay = self.config.stall_decay;
        let confidence = if self.stalled_ticks >= self.config.idle_after_stalled_ticks {
            0.0
        } else {
            last_confidence * decay
        };

        EnergySample {
            stream_id: self.stream_id.clone(),
            tick_id,
            value: (last_value * decay).clamp(0.0, 1.0),
            confidence,
        }
    }

    /// Consecutive ticks without samples.
    pub fn stalled_ticks(&self) -> u32 {
        self.stalled_ticks
    }

    /// `true` once the stream has stalled long enough to be reported idle,
    /// or if it never produced a sample.
    pub fn is_idle(&self) -> bool {
        self.previous.as_ref().map_or(true, |s| !s.is_active())
    }

    /// The last accepted sequence number.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Total samples discarded since creation.
    pub fn discarded_total(&self) -> u64 {
        self.discarded_total
    }

    /// Recent energy samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &EnergySample> {
        self.history.iter()
    }

    /// Mean energy over the retained history.
    pub fn average_energy(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(|s| s.value).sum::<f32>() / self.history.len() as f32
    }
}
