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

//! A sample extension tracking the fused energy trend.

use cadence_core::{Extension, QualityLevel, TickView};

/// Keeps an exponential moving average of the fused energy and logs when it
/// crosses the midpoint.
///
/// At [`QualityLevel::Low`] only every other tick is sampled.
#[derive(Debug)]
pub struct EnergyTrend {
    alpha: f32,
    average: Option<f32>,
    above_midpoint: bool,
}

impl EnergyTrend {
    /// `alpha` is the smoothing factor, clamped to `(0, 1]`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            average: None,
            above_midpoint: false,
        }
    }

    /// The current average, once at least one tick was sampled.
    pub fn average(&self) -> Option<f32> {
        self.average
    }

    /// Folds in one value. Returns `Some(rising)` when the midpoint was crossed.
    fn update(&mut self, energy: f32) -> Option<bool> {
        let average = match self.average {
            Some(previous) => previous + self.alpha * (energy - previous),
            None => energy,
        };
        self.average = Some(average);

        let above = average > 0.5;
        if above == self.above_midpoint {
            return None;
        }
        self.above_midpoint = above;
        Some(above)
    }
}

impl Extension for EnergyTrend {
    fn on_tick(&mut self, view: &TickView) {
        if view.quality == QualityLevel::Low && view.tick_id % 2 == 1 {
            return;
        }
        if let Some(rising) = self.update(view.total_energy) {
            let direction = if rising { "rose above" } else { "fell below" };
            log::info!(
                "Trend: energy {direction} the midpoint at tick {} (average {:.3})",
                view.tick_id,
                self.average.unwrap_or_default()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(tick_id: u64, quality: QualityLevel, total_energy: f32) -> TickView {
        TickView {
            tick_id,
            quality,
            total_energy,
            interference_score: None,
            streams: Vec::new(),
        }
    }

    #[test]
    fn test_crossings_are_reported_once() {
        let mut trend = EnergyTrend::new(1.0);
        assert_eq!(trend.update(0.2), None);
        assert_eq!(trend.update(0.8), Some(true));
        assert_eq!(trend.update(0.9), None);
        assert_eq!(trend.update(0.1), Some(false));
    }

    #[test]
    fn test_average_is_smoothed() {
        let mut trend = EnergyTrend::new(0.5);
        trend.update(0.0);
        trend.update(1.0);
        assert_eq!(trend.average(), Some(0.5));
    }

    #[test]
    fn test_low_quality_samples_every_other_tick() {
        let mut trend = EnergyTrend::new(1.0);
        trend.on_tick(&view(0, QualityLevel::Low, 0.3));
        trend.on_tick(&view(1, QualityLevel::Low, 0.9));
        assert_eq!(trend.average(), Some(0.3));
        trend.on_tick(&view(1, QualityLevel::High, 0.9));
        assert_eq!(trend.average(), Some(0.9));
    }
}
