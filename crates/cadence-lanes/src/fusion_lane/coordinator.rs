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

//! Fuses per-stream energy samples into one frame per tick.

use super::interference::interference_score;
use cadence_core::quality::QualityLevel;
use cadence_core::stream::{EnergySample, FusedEnergyFrame, StreamConfig, StreamId};
use cadence_core::utils::RingBuffer;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct StreamSlot {
    weight: f32,
    recent: RingBuffer<f32>,
}

/// Combines the energy of every known stream.
///
/// The total is a confidence-weighted average, so idle streams
/// (`confidence == 0`) carry no weight. The interference score is computed
/// from the last `window` energies of each active stream, and only when at
/// least two streams are active and quality is at least
/// [`QualityLevel::Medium`].
#[derive(Debug, Clone)]
pub struct StreamCoordinator {
    window: usize,
    streams: BTreeMap<StreamId, StreamSlot>,
}

impl StreamCoordinator {
    /// Creates a coordinator keeping `window` recent energies per stream.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            streams: BTreeMap::new(),
        }
    }

    /// Registers a stream, or updates its weight if already known.
    pub fn add_stream(&mut self, config: &StreamConfig) {
        let window = self.window;
        self.streams
            .entry(config.id.clone())
            .and_modify(|slot| slot.weight = config.weight)
            .or_insert_with(|| StreamSlot {
                weight: config.weight,
                recent: RingBuffer::new(window),
            });
    }

    /// Forgets a stream and its history. Returns `false` if it was unknown.
    pub fn remove_stream(&mut self, id: &StreamId) -> bool {
        self.streams.remove(id).is_some()
    }

    /// Number of registered streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Fusion weight of a stream.
    pub fn weight(&self, id: &StreamId) -> Option<f32> {
        self.streams.get(id).map(|slot| slot.weight)
    }

    /// Builds the frame for one tick.
    ///
    /// Samples for streams that were never registered are fused with weight
    /// `1.0` and start their own history.
    pub fn fuse(
        &mut self,
        tick_id: u64,
        timestamp_ms: u64,
        per_stream: BTreeMap<StreamId, EnergySample>,
        quality: QualityLevel,
    ) -> FusedEnergyFrame {
        let mut weighted_sum = 0.0f32;
        let mut weight_total = 0.0f32;
        let mut active_stream_count = 0usize;

        for (id, sample) in &per_stream {
            let window = self.window;
            let slot = self
                .streams
                .entry(id.clone())
                .or_insert_with(|| StreamSlot {
                    weight: 1.0,
                    recent: RingBuffer::new(window),
                });
            slot.recent.push(sample.value);

            if sample.is_active() {
                active_stream_count += 1;
                let w = slot.weight * sample.confidence;
                weighted_sum += w * sample.value;
                weight_total += w;
            }
        }

        let total_energy = if weight_total > 0.0 {
            (weighted_sum / weight_total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let interference_score = if active_stream_count >= 2 && quality >= QualityLevel::Medium {
            let series: Vec<Vec<f32>> = per_stream
                .iter()
                .filter(|(_, sample)| sample.is_active())
                .filter_map(|(id, _)| self.streams.get(id))
                .map(|slot| slot.recent.iter().copied().collect())
                .collect();
            let views: Vec<&[f32]> = series.iter().map(Vec::as_slice).collect();
            Some(interference_score(&views))
        } else {
            None
        };

        FusedEnergyFrame {
            tick_id,
            timestamp_ms,
            total_energy,
            per_stream,
            interference_score,
            active_stream_count,
        }
    }
}
